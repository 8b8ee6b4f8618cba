//! Wire protocol between an explorer UI and the server.

use serde::{Deserialize, Serialize};

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open the session to the configured endpoint.
    Connect,
    /// Close the session.
    Disconnect,
    /// List child directories of a remote folder.
    ListDirectories { path: String },
    /// List files directly inside a remote folder.
    ListFiles { path: String },
    /// Copy a server-local file into the remote session.
    Upload { local_path: String, remote_path: String },
    /// Copy a remote file to a server-local path.
    Download { remote_path: String, local_path: String },
    /// Delete a remote item.
    Delete { path: String },
    /// Rename a remote item.
    Rename { path: String, new_name: String },
    /// Extract a zip archive; into its own folder when no destination is given.
    Extract {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<String>,
    },
    /// Ping for keepalive.
    Ping,
}

impl ClientMessage {
    /// Short operation name used in logs and `completed` replies.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::ListDirectories { .. } => "list_directories",
            Self::ListFiles { .. } => "list_files",
            Self::Upload { .. } => "upload",
            Self::Download { .. } => "download",
            Self::Delete { .. } => "delete",
            Self::Rename { .. } => "rename",
            Self::Extract { .. } => "extract",
            Self::Ping => "ping",
        }
    }
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session opened; carries the directories of the default root.
    Connected { root: String, directories: Vec<String> },
    /// Session closed.
    Disconnected,
    /// Directory listing.
    Directories { path: String, items: Vec<String> },
    /// File listing.
    Files { path: String, items: Vec<String> },
    /// An operation without a payload finished.
    Completed { operation: String },
    /// Progress of the request in flight.
    Progress { percent: u8 },
    /// Error message.
    Error { message: String },
    /// Pong response.
    Pong,
}

impl ServerMessage {
    #[must_use]
    pub fn completed(operation: &str) -> Self {
        Self::Completed {
            operation: operation.to_string(),
        }
    }

    #[must_use]
    pub fn error(err: &impl std::fmt::Display) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}
