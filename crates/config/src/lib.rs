//! Configuration loading, validation, and management for ForgeLoop.
//!
//! Loads configuration from `~/.forgeloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use forgeloop_core::approval::{AutonomyLevel, PolicyGate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.forgeloop/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model endpoint settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Loop behavior
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool execution settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Approval policy
    #[serde(default)]
    pub approval: ApprovalConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum loop iterations per invocation
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Generate a milestone plan for multi-step objectives
    #[serde(default = "default_true")]
    pub enable_task_planning: bool,

    /// Override the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_steps() -> u32 {
    25
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            enable_task_planning: true,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default workspace root when a call has no working directory
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Timeout for synchronous command execution
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Remote tool server; the in-process server is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_server_url: Option<String>,
}

fn default_workspace_root() -> PathBuf {
    AppConfig::config_dir().join("workspace")
}
fn default_command_timeout() -> u64 {
    300
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            command_timeout_secs: default_command_timeout(),
            tool_server_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default)]
    pub level: AutonomyLevel,

    /// Commands pre-approved in `supervised` mode (matched on the first word)
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

fn default_allowed_commands() -> Vec<String> {
    [
        "ls", "cat", "pwd", "echo", "grep", "find", "git", "npm", "npx", "yarn", "pnpm", "node",
        "cargo", "python", "pip", "mkdir", "touch",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            level: AutonomyLevel::default(),
            allowed_commands: default_allowed_commands(),
        }
    }
}

impl ApprovalConfig {
    /// Build the policy gate described by this section.
    pub fn gate(&self) -> PolicyGate {
        PolicyGate::new(self.level, self.allowed_commands.clone())
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.forgeloop/config.toml).
    ///
    /// Environment overrides:
    /// - `FORGELOOP_API_KEY`, then `OPENAI_API_KEY`
    /// - `FORGELOOP_MODEL`, `FORGELOOP_ENDPOINT`, `FORGELOOP_WORKSPACE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = lookup("FORGELOOP_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(model) = lookup("FORGELOOP_MODEL") {
            self.llm.model = model;
        }
        if let Some(endpoint) = lookup("FORGELOOP_ENDPOINT") {
            self.llm.endpoint = endpoint;
        }
        if let Some(workspace) = lookup("FORGELOOP_WORKSPACE") {
            self.tools.workspace_root = PathBuf::from(workspace);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".forgeloop")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be > 0".into(),
            ));
        }
        if self.tools.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.command_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
