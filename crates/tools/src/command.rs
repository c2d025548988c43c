//! Command-line analysis for `execute_command`.
//!
//! - `cd <dir> && <rest>` prefixes become a working-directory change, since
//!   the command executor keeps no shell state between calls.
//! - Package-manager script idioms (`npm run dev`, `yarn start`, ...) are
//!   recognized so the script body can be looked up in `package.json`.
//! - Resolved scripts are classified as dev servers (never terminate) or
//!   ordinary commands.

use regex_lite::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Script names that start long-running servers.
pub const DEV_SERVER_SCRIPTS: &[&str] = &["dev", "start", "serve"];

/// Tokens that mark a command as one-shot (build/test/lint) work.
const ONE_SHOT_TOKENS: &[&str] = &["build", "test", "lint", "jest", "tsc", "eslint", "prettier"];

/// Subcommands that `yarn <x>` / `pnpm <x>` treat as built-ins rather than scripts.
const MANAGER_BUILTINS: &[&str] = &[
    "add", "install", "i", "remove", "rm", "upgrade", "update", "init", "create", "dlx", "exec",
    "info", "list", "ls", "link", "unlink", "publish", "why", "outdated", "config", "cache",
    "global", "audit", "import", "store", "bin", "help",
];

fn cd_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)^\s*cd\s+(?:"([^"]+)"|'([^']+)'|(\S+))\s*&&\s*(.+)$"#)
            .unwrap_or_else(|e| panic!("invalid cd pattern: {e}"))
    })
}

fn run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(npm|pnpm|yarn|bun)\s+(?:run|run-script)\s+([\w:.@/-]+)(?:\s+(.*))?$")
            .unwrap_or_else(|e| panic!("invalid run pattern: {e}"))
    })
}

fn shorthand_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(npm|pnpm|yarn|bun)\s+([\w:.@/-]+)(?:\s+(.*))?$")
            .unwrap_or_else(|e| panic!("invalid shorthand pattern: {e}"))
    })
}

/// Peel leading `cd <dir> &&` segments off `command`.
///
/// Returns the effective directory (relative dirs are joined onto
/// `working_dir`, absolute ones replace it) and the remaining command.
pub fn split_cd_prefix(command: &str, working_dir: &Path) -> (PathBuf, String) {
    let mut dir = working_dir.to_path_buf();
    let mut rest = command.trim().to_string();

    while let Some(caps) = cd_regex().captures(&rest) {
        let target = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or(".");
        dir = dir.join(target);
        rest = caps
            .get(4)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
    }

    (dir, rest)
}

/// A package-manager script invocation such as `npm run dev -- --port 3000`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInvocation {
    pub manager: String,
    pub script: String,
    /// Arguments forwarded to the script, without the `--` separator.
    pub extra_args: Option<String>,
}

impl ScriptInvocation {
    /// Recognize `npm run <s>`, `npm start`, `npm test`, `yarn [run] <s>`,
    /// `pnpm [run] <s>`, and `bun run <s>`.
    pub fn parse(command: &str) -> Option<Self> {
        let command = command.trim();

        if let Some(caps) = run_regex().captures(command) {
            return Some(Self::from_parts(&caps[1], &caps[2], caps.get(3).map(|m| m.as_str())));
        }

        let caps = shorthand_regex().captures(command)?;
        let manager = &caps[1];
        let script = &caps[2];
        let accepted = match manager {
            // npm and bun only run lifecycle shorthands without `run`
            "npm" => matches!(script, "start" | "test"),
            "bun" => false,
            _ => !MANAGER_BUILTINS.contains(&script),
        };
        accepted.then(|| Self::from_parts(manager, script, caps.get(3).map(|m| m.as_str())))
    }

    fn from_parts(manager: &str, script: &str, extra: Option<&str>) -> Self {
        let extra_args = extra
            .map(|e| e.trim().trim_start_matches("--").trim().to_string())
            .filter(|e| !e.is_empty());
        Self {
            manager: manager.to_string(),
            script: script.to_string(),
            extra_args,
        }
    }

    /// The script body with forwarded arguments appended.
    pub fn resolve(&self, body: &str) -> String {
        match &self.extra_args {
            Some(extra) => format!("{} {extra}", body.trim()),
            None => body.trim().to_string(),
        }
    }
}

/// The subset of `package.json` this crate reads.
#[derive(Debug, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
}

impl PackageManifest {
    /// Parse manifest text; `None` for anything that is not valid JSON.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn script(&self, name: &str) -> Option<&str> {
        self.scripts.get(name).map(String::as_str)
    }
}

/// True when `resolved` is build, test, or lint work.
///
/// Each chained command is judged by its leading words, up to the first flag,
/// so flag values like `--mode test` do not count. Watch mode is never one-shot.
pub fn is_one_shot(resolved: &str) -> bool {
    let lowered = resolved.to_lowercase();
    lowered
        .split(['&', ';', '|'])
        .any(|segment| {
            let tokens: Vec<&str> = segment.split_whitespace().collect();
            if tokens.iter().any(|t| *t == "-w" || *t == "--watch" || t.starts_with("--watch=")) {
                return false;
            }
            let words: Vec<&str> = tokens
                .iter()
                .copied()
                .take_while(|t| !t.starts_with('-'))
                .map(|t| t.rsplit('/').next().unwrap_or(t))
                .collect();
            words.windows(2).any(|pair| pair == ["vitest", "run"])
                || words.iter().any(|w| ONE_SHOT_TOKENS.contains(w))
        })
}

/// A dev server is a `dev`/`start`/`serve` script whose body is not one-shot work.
pub fn is_dev_server(script: &str, resolved: &str) -> bool {
    DEV_SERVER_SCRIPTS.contains(&script) && !is_one_shot(resolved)
}

/// Quote `text` for a POSIX shell.
pub fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}
