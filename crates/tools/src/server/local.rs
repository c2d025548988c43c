//! In-process tool server.
//!
//! Files go through `tokio::fs`, commands through `sh -c`, and terminals are
//! persistent `sh` processes whose stdin stays open. Terminal output is kept
//! in a bounded line buffer fed by background reader tasks.

use async_trait::async_trait;
use forgeloop_core::error::ToolError;
use forgeloop_core::tool::{ToolServer, ToolServerRequest, ToolServerResponse};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    DELETE_FILE, EXECUTE_COMMAND, LIST_DIRECTORY, READ_FILE, TERMINAL_CREATE, TERMINAL_KILL,
    TERMINAL_READ, TERMINAL_SEND_TEXT, WORKSPACE_ROOT, WRITE_FILE,
};

const DEFAULT_BUFFER_LINES: usize = 2000;
const DEFAULT_READ_LINES: usize = 200;

type OutputBuffer = Arc<Mutex<VecDeque<String>>>;

struct LocalTerminal {
    name: String,
    child: Child,
    stdin: ChildStdin,
    output: OutputBuffer,
}

/// Executes tool server requests on the local machine.
pub struct LocalToolServer {
    terminals: Mutex<HashMap<String, LocalTerminal>>,
    buffer_lines: usize,
}

impl LocalToolServer {
    pub fn new() -> Self {
        Self {
            terminals: Mutex::new(HashMap::new()),
            buffer_lines: DEFAULT_BUFFER_LINES,
        }
    }

    /// Cap on lines retained per terminal.
    pub fn with_buffer_lines(mut self, lines: usize) -> Self {
        self.buffer_lines = lines.max(1);
        self
    }

    /// Number of live terminals.
    pub async fn terminal_count(&self) -> usize {
        self.terminals.lock().await.len()
    }

    async fn read_file(&self, cwd: &Path, params: &Value) -> ToolServerResponse {
        let Ok(path) = str_param(params, "path") else {
            return ToolServerResponse::failed("Missing 'path' parameter");
        };
        match tokio::fs::read_to_string(cwd.join(path)).await {
            Ok(content) => ToolServerResponse::ok(json!({ "path": path, "content": content })),
            Err(e) => ToolServerResponse::failed(format!("Failed to read {path}: {e}")),
        }
    }

    async fn write_file(&self, cwd: &Path, params: &Value) -> ToolServerResponse {
        let (Ok(path), Ok(content)) = (str_param(params, "path"), str_param(params, "content"))
        else {
            return ToolServerResponse::failed("Missing 'path' or 'content' parameter");
        };
        let target = cwd.join(path);
        if let Some(parent) = target.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolServerResponse::failed(format!("Failed to create {}: {e}", parent.display()));
            }
        }
        match tokio::fs::write(&target, content).await {
            Ok(()) => ToolServerResponse::ok(json!({ "path": path, "bytesWritten": content.len() })),
            Err(e) => ToolServerResponse::failed(format!("Failed to write {path}: {e}")),
        }
    }

    async fn list_directory(&self, cwd: &Path, params: &Value) -> ToolServerResponse {
        let path = params.get("path").and_then(Value::as_str).unwrap_or(".");
        let mut reader = match tokio::fs::read_dir(cwd.join(path)).await {
            Ok(reader) => reader,
            Err(e) => return ToolServerResponse::failed(format!("Failed to list {path}: {e}")),
        };

        let mut entries = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                    entries.push((entry.file_name().to_string_lossy().to_string(), is_dir));
                }
                Ok(None) => break,
                Err(e) => return ToolServerResponse::failed(format!("Failed to list {path}: {e}")),
            }
        }
        entries.sort();

        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(name, is_dir)| json!({ "name": name, "isDir": is_dir }))
            .collect();
        ToolServerResponse::ok(json!({ "path": path, "entries": entries }))
    }

    async fn delete_file(&self, cwd: &Path, params: &Value) -> ToolServerResponse {
        let Ok(path) = str_param(params, "path") else {
            return ToolServerResponse::failed("Missing 'path' parameter");
        };
        let target = cwd.join(path);
        let removed = match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&target).await,
            Ok(_) => tokio::fs::remove_file(&target).await,
            Err(e) => Err(e),
        };
        match removed {
            Ok(()) => ToolServerResponse::ok(json!({ "path": path, "deleted": true })),
            Err(e) => ToolServerResponse::failed(format!("Failed to delete {path}: {e}")),
        }
    }

    async fn execute_command(&self, cwd: &Path, params: &Value) -> ToolServerResponse {
        let Ok(command) = str_param(params, "command") else {
            return ToolServerResponse::failed("Missing 'command' parameter");
        };

        debug!(command = %command, cwd = %cwd.display(), "Executing command");

        // Dropping the future (orchestrator timeout) kills the child.
        let output = Command::new("sh")
            .args(["-c", command])
            .current_dir(cwd)
            .env("PATH", search_path(cwd))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => {
                let exit_code = output.status.code().unwrap_or(-1);
                if exit_code != 0 {
                    warn!(command = %command, exit_code, "Command exited non-zero");
                }
                ToolServerResponse::ok(json!({
                    "stdout": String::from_utf8_lossy(&output.stdout),
                    "stderr": String::from_utf8_lossy(&output.stderr),
                    "exitCode": exit_code,
                }))
            }
            Err(e) => ToolServerResponse::failed(format!("Failed to spawn `{command}`: {e}")),
        }
    }

    async fn terminal_create(&self, cwd: &Path, params: &Value) -> ToolServerResponse {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("terminal")
            .to_string();

        let spawned = Command::new("sh")
            .current_dir(cwd)
            .env("PATH", search_path(cwd))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return ToolServerResponse::failed(format!("Failed to start terminal: {e}")),
        };

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return ToolServerResponse::failed("Terminal process has no stdio pipes");
        };

        let output: OutputBuffer = Arc::new(Mutex::new(VecDeque::new()));
        pump(stdout, output.clone(), self.buffer_lines);
        pump(stderr, output.clone(), self.buffer_lines);

        let id = uuid::Uuid::new_v4().to_string();
        info!(terminal_id = %id, name = %name, cwd = %cwd.display(), "Terminal created");
        self.terminals.lock().await.insert(
            id.clone(),
            LocalTerminal {
                name: name.clone(),
                child,
                stdin,
                output,
            },
        );

        ToolServerResponse::ok(json!({ "terminalId": id, "name": name }))
    }

    async fn terminal_send_text(&self, params: &Value) -> ToolServerResponse {
        let (Ok(id), Ok(text)) = (str_param(params, "terminalId"), str_param(params, "text")) else {
            return ToolServerResponse::failed("Missing 'terminalId' or 'text' parameter");
        };
        let add_new_line = params
            .get("addNewLine")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let mut terminals = self.terminals.lock().await;
        let Some(terminal) = terminals.get_mut(id) else {
            return ToolServerResponse::failed(format!("Unknown terminal: {id}"));
        };

        let mut payload = text.to_string();
        if add_new_line {
            payload.push('\n');
        }
        let written = async {
            terminal.stdin.write_all(payload.as_bytes()).await?;
            terminal.stdin.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                debug!(terminal_id = %id, name = %terminal.name, "Sent text to terminal");
                ToolServerResponse::ok(json!({ "terminalId": id }))
            }
            Err(e) => ToolServerResponse::failed(format!("Failed to write to terminal {id}: {e}")),
        }
    }

    async fn terminal_read(&self, params: &Value) -> ToolServerResponse {
        let Ok(id) = str_param(params, "terminalId") else {
            return ToolServerResponse::failed("Missing 'terminalId' parameter");
        };
        let max_lines = params
            .get("maxLines")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_READ_LINES);

        let output = {
            let terminals = self.terminals.lock().await;
            match terminals.get(id) {
                Some(terminal) => terminal.output.clone(),
                None => return ToolServerResponse::failed(format!("Unknown terminal: {id}")),
            }
        };

        let buffer = output.lock().await;
        let skip = buffer.len().saturating_sub(max_lines);
        let lines: Vec<&str> = buffer.iter().skip(skip).map(String::as_str).collect();
        ToolServerResponse::ok(json!({
            "terminalId": id,
            "output": lines.join("\n"),
            "lines": lines.len(),
        }))
    }

    async fn terminal_kill(&self, params: &Value) -> ToolServerResponse {
        let Ok(id) = str_param(params, "terminalId") else {
            return ToolServerResponse::failed("Missing 'terminalId' parameter");
        };

        let Some(mut terminal) = self.terminals.lock().await.remove(id) else {
            return ToolServerResponse::failed(format!("Unknown terminal: {id}"));
        };
        if let Err(e) = terminal.child.start_kill() {
            warn!(terminal_id = %id, error = %e, "Terminal process already gone");
        }
        info!(terminal_id = %id, name = %terminal.name, "Terminal killed");
        ToolServerResponse::ok(json!({ "terminalId": id, "killed": true }))
    }
}

impl Default for LocalToolServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolServer for LocalToolServer {
    fn name(&self) -> &str {
        "local"
    }

    fn capabilities(&self) -> Vec<String> {
        super::standard_capabilities()
    }

    async fn execute(&self, request: ToolServerRequest) -> Result<ToolServerResponse, ToolError> {
        let params = &request.parameters;
        let Some(cwd) = workspace(params).await? else {
            return Ok(ToolServerResponse::failed(format!(
                "No such directory: {}",
                str_param(params, "cwd")?
            )));
        };

        let response = match request.tool.as_str() {
            READ_FILE => self.read_file(&cwd, params).await,
            WRITE_FILE => self.write_file(&cwd, params).await,
            LIST_DIRECTORY => self.list_directory(&cwd, params).await,
            DELETE_FILE => self.delete_file(&cwd, params).await,
            EXECUTE_COMMAND => self.execute_command(&cwd, params).await,
            TERMINAL_CREATE => self.terminal_create(&cwd, params).await,
            TERMINAL_SEND_TEXT => self.terminal_send_text(params).await,
            TERMINAL_READ => self.terminal_read(params).await,
            TERMINAL_KILL => self.terminal_kill(params).await,
            other => return Err(ToolError::NotFound(other.to_string())),
        };
        Ok(response)
    }
}

/// The `cwd` parameter as an existing directory.
///
/// `None` means `cwd` is missing inside a workspace that is still there, a
/// plain tool failure. The workspace itself is `workspaceRoot`, or `cwd` when
/// the caller sent no root.
async fn workspace(params: &Value) -> Result<Option<PathBuf>, ToolError> {
    let cwd = str_param(params, "cwd")?;
    if is_dir(cwd).await {
        return Ok(Some(PathBuf::from(cwd)));
    }

    match params.get(WORKSPACE_ROOT).and_then(Value::as_str) {
        Some(root) if root != cwd && is_dir(root).await => {
            debug!(cwd = %cwd, root = %root, "Working directory missing inside workspace");
            Ok(None)
        }
        Some(root) => Err(ToolError::WorkspaceUnreachable(root.to_string())),
        None => Err(ToolError::WorkspaceUnreachable(cwd.to_string())),
    }
}

async fn is_dir(path: &str) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' parameter")))
}

/// `PATH` with the project's `node_modules/.bin` in front.
fn search_path(cwd: &Path) -> OsString {
    let inherited = std::env::var_os("PATH").unwrap_or_default();
    let mut dirs = vec![cwd.join("node_modules").join(".bin")];
    dirs.extend(std::env::split_paths(&inherited));
    std::env::join_paths(dirs).unwrap_or(inherited)
}

fn pump<R>(reader: R, buffer: OutputBuffer, limit: usize)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut buffer = buffer.lock().await;
            while buffer.len() >= limit {
                buffer.pop_front();
            }
            buffer.push_back(line);
        }
    });
}
