//! Tool server implementations.
//!
//! A tool server executes `{tool, parameters}` requests against a workspace.
//! Every request carries a `cwd` parameter naming the directory it is bound to.

pub mod http;
pub mod local;

pub use http::HttpToolServer;
pub use local::LocalToolServer;

pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const LIST_DIRECTORY: &str = "list_directory";
pub const DELETE_FILE: &str = "delete_file";
pub const EXECUTE_COMMAND: &str = "execute_command";
pub const TERMINAL_CREATE: &str = "terminal_create";
pub const TERMINAL_SEND_TEXT: &str = "terminal_send_text";
pub const TERMINAL_READ: &str = "terminal_read";
pub const TERMINAL_KILL: &str = "terminal_kill";

/// Request parameter naming the directory the whole call is bound to. `cwd`
/// may be a subdirectory of it picked by the model.
pub const WORKSPACE_ROOT: &str = "workspaceRoot";

/// The full server-side tool set understood by this crate.
pub const STANDARD_CAPABILITIES: &[&str] = &[
    READ_FILE,
    WRITE_FILE,
    LIST_DIRECTORY,
    DELETE_FILE,
    EXECUTE_COMMAND,
    TERMINAL_CREATE,
    TERMINAL_SEND_TEXT,
    TERMINAL_READ,
    TERMINAL_KILL,
];

pub(crate) fn standard_capabilities() -> Vec<String> {
    STANDARD_CAPABILITIES.iter().map(|c| c.to_string()).collect()
}
