//! MCP (Model Context Protocol) client side: a tool server running as a child
//! process, spoken to over length-framed JSON-RPC on its stdio.
//!
//! - [`frame`]: `Content-Length` framing, with a headerless raw-JSON fallback
//! - [`session`]: child process lifecycle ([`ProcessSession`])
//! - [`client`]: request/response correlation behind a call gate ([`RpcClient`])

pub mod client;
pub mod frame;
pub mod session;

pub use client::{McpClient, RpcClient, ToolCaller, Transport};
pub use session::{ProcessSession, SessionState};

/// JSON-RPC protocol version sent with every request
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of the tool invocation envelope
pub const TOOLS_CALL_METHOD: &str = "tools/call";

/// Errors raised while starting a tool server or calling its tools
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The tool server could not be brought up
    #[error("tool server failed to start: {0}")]
    Startup(#[from] StartupFailure),

    /// A call was attempted while the session is not running
    #[error("MCP session is not active; call start() first")]
    NotActive,

    /// A previous protocol failure left the streams in an unknown state
    #[error("MCP session is unusable after a protocol failure; restart it")]
    Broken,

    /// Malformed frame, header or envelope
    #[error("protocol failure: {0}")]
    Protocol(String),

    /// The server closed its output before a complete frame was read
    #[error("protocol failure: connection closed unexpectedly")]
    ConnectionClosed,

    /// The server reported a tool-level error
    #[error("tool '{tool}' failed (code {code}): {message}")]
    Tool {
        tool: String,
        code: i64,
        message: String,
    },

    /// IO error on the process streams
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl McpError {
    /// Whether this failure leaves the wire in an unknown state
    pub fn is_protocol_failure(&self) -> bool {
        matches!(
            self,
            McpError::Protocol(_) | McpError::ConnectionClosed | McpError::Io(_)
        )
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Protocol(format!("JSON: {}", err))
    }
}

/// Reasons a tool server did not reach the running state
#[derive(Debug, thiserror::Error)]
pub enum StartupFailure {
    #[error("command not found: '{command}'; is it installed and on PATH?")]
    CommandNotFound { command: String },

    #[error("process exited during startup (exit code {}): {stderr}", exit_code_label(.exit_code))]
    ExitedEarly {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("invalid server command: {0}")]
    InvalidCommand(String),

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}
