//! Execution context: dispatches commands and scripts through a runspace.

use std::sync::Arc;

use crate::{
    ProgressHandler,
    error::RemoteExecutionError,
    progress::NoProgress,
    request::{CommandRequest, Invocation, ParamValue, ScriptRequest, SessionHandle},
    result::OutputRecord,
    script::{ARGS_VARIABLE, SESSION_VARIABLE, local_wrapper, session_wrapper},
    traits::{Runspace, RunspaceFactory},
};

/// Target name used in errors raised by purely local commands.
pub const LOCALHOST: &str = "localhost";

/// Local execution environment, optionally forwarding scripts into a remote session.
///
/// Owns one runspace from `open` until `close`. Sessions are created through
/// it, so it must outlive every `SessionHandle` it hands out.
pub struct ExecutionContext {
    runspace: Option<Arc<dyn Runspace>>,
    remote_target: String,
    progress: Arc<dyn ProgressHandler>,
}

impl ExecutionContext {
    /// Open a fresh runspace from `factory`.
    ///
    /// `remote_target` names the host in errors raised by `run_script`.
    ///
    /// # Errors
    /// Returns error if the runspace cannot be opened.
    pub async fn open(
        factory: &dyn RunspaceFactory,
        remote_target: impl Into<String>,
    ) -> Result<Self, RemoteExecutionError> {
        let runspace = factory.open().await?;
        Ok(Self::with_runspace(runspace, remote_target))
    }

    /// Wrap an already opened runspace.
    #[must_use]
    pub fn with_runspace(runspace: Box<dyn Runspace>, remote_target: impl Into<String>) -> Self {
        Self {
            runspace: Some(Arc::from(runspace)),
            remote_target: remote_target.into(),
            progress: Arc::new(NoProgress),
        }
    }

    /// Set the handler that receives progress percentages.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn remote_target(&self) -> &str {
        &self.remote_target
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.runspace.is_some()
    }

    /// Handle that closes the runspace without borrowing the context.
    ///
    /// Closing through it while a call is in flight makes that call fail with
    /// `ContextClosed` (or a host error) instead of waiting for it to finish.
    #[must_use]
    pub fn shutdown_handle(&self) -> Option<Arc<dyn Runspace>> {
        self.runspace.clone()
    }

    /// Run a named command with keyword parameters in the local environment.
    ///
    /// # Errors
    /// Returns `Failed` (target `localhost`) if the error channel is non-empty,
    /// `ContextClosed` after `close`.
    pub async fn run_command(
        &self,
        command: CommandRequest,
    ) -> Result<Vec<OutputRecord>, RemoteExecutionError> {
        let runspace = self.runspace()?;
        let text = command.name().to_string();
        tracing::debug!(command = %text, "Running command");

        let result = runspace
            .invoke(Invocation::Command(command), self.progress.as_ref())
            .await?;
        result.into_output(&text, LOCALHOST)
    }

    /// Run a script template, inside `session` when given, locally otherwise.
    ///
    /// With a session, the handle and the argument array are bound as variables
    /// and a wrapper invokes the parsed block through `Invoke-Command -Session`.
    /// Without one, the arguments are passed as the wrapper's own invocation
    /// arguments.
    ///
    /// # Errors
    /// Returns `Failed` (target: the remote host) if the error channel is non-empty,
    /// `ContextClosed` after `close`.
    pub async fn run_script(
        &self,
        body: &str,
        args: Vec<ParamValue>,
        session: Option<SessionHandle>,
    ) -> Result<Vec<OutputRecord>, RemoteExecutionError> {
        let runspace = self.runspace()?;
        let has_args = !args.is_empty();

        let request = match session {
            Some(session) => {
                let mut request = ScriptRequest::new(session_wrapper(body, has_args))
                    .variable(SESSION_VARIABLE, session);
                if has_args {
                    request = request.variable(ARGS_VARIABLE, ParamValue::Array(args));
                }
                request
            }
            None => ScriptRequest::new(local_wrapper(body, has_args)).arguments(args),
        };

        tracing::debug!(
            target_host = %self.remote_target,
            in_session = session.is_some(),
            "Running script"
        );

        let result = runspace
            .invoke(Invocation::Script(request), self.progress.as_ref())
            .await?;
        result.into_output(body, &self.remote_target)
    }

    /// Dispose the runspace, invalidating every session created through it.
    ///
    /// # Errors
    /// Returns error if the runspace fails to shut down cleanly; it is released either way.
    pub async fn close(&mut self) -> Result<(), RemoteExecutionError> {
        match self.runspace.take() {
            Some(runspace) => runspace.close().await,
            None => Ok(()),
        }
    }

    fn runspace(&self) -> Result<&dyn Runspace, RemoteExecutionError> {
        self.runspace
            .as_deref()
            .ok_or(RemoteExecutionError::ContextClosed)
    }
}
