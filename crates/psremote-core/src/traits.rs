//! Core traits for the execution environment.

use async_trait::async_trait;

use crate::{ProgressHandler, error::RemoteExecutionError, request::Invocation, result::ExecutionResult};

/// A live execution environment able to run commands and scripts.
///
/// One runspace backs one `ExecutionContext`. Implementations keep live objects
/// (session options, sessions, credentials) addressable by `ObjectHandle` until
/// the runspace is closed.
#[async_trait]
pub trait Runspace: Send + Sync {
    /// Run one invocation to completion.
    ///
    /// Returns the raw output and error channel; a non-empty error channel is
    /// not an `Err` at this level. `Err` means the environment itself failed.
    async fn invoke(
        &self,
        invocation: Invocation,
        progress: &dyn ProgressHandler,
    ) -> Result<ExecutionResult, RemoteExecutionError>;

    /// Dispose the environment and every live object it holds.
    async fn close(&self) -> Result<(), RemoteExecutionError>;
}

/// Creates fresh runspaces.
#[async_trait]
pub trait RunspaceFactory: Send + Sync {
    /// Open a new runspace.
    async fn open(&self) -> Result<Box<dyn Runspace>, RemoteExecutionError>;
}
