//! Error type surfaced at the core boundary.

use thiserror::Error;

/// Markers in a remote error message that mean the session itself is gone.
const TRANSPORT_MARKERS: &[&str] = &[
    "PSRemotingTransportException",
    "PSRemotingDataStructureException",
    "session state is Broken",
    "session state is Closed",
];

/// Failure of a command, script or session lifecycle operation.
#[derive(Debug, Error)]
pub enum RemoteExecutionError {
    /// The execution environment reported entries on its error channel.
    #[error("Failed to run script ({script}) on {target} got errors: {message}")]
    Failed {
        script: String,
        target: String,
        message: String,
    },
    #[error("No remote session is open")]
    NotConnected,
    #[error("A remote session is already open; close it first")]
    AlreadyConnected,
    #[error("Execution context is closed")]
    ContextClosed,
    #[error("{command} returned {actual} objects, expected {expected}")]
    UnexpectedOutput {
        command: String,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The execution environment itself failed (spawn, pipe, protocol).
    #[error("Execution host error: {0}")]
    Host(String),
}

impl RemoteExecutionError {
    /// Whether the failure means the session is unusable and must be reopened.
    #[must_use]
    pub fn is_transport_failure(&self) -> bool {
        match self {
            Self::Host(_) | Self::ContextClosed => true,
            Self::Failed { message, .. } => TRANSPORT_MARKERS.iter().any(|m| message.contains(m)),
            _ => false,
        }
    }
}
