//! `pwsh`-backed runspace.

use std::{
    process::Stdio,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use psremote_core::{
    ExecutionResult, Invocation, ProgressHandler, RemoteExecutionError, Runspace, RunspaceFactory,
    progress::clamp_percent,
};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{ChildStderr, Command},
    sync::Mutex,
};
use uuid::Uuid;

use crate::{
    command::{CommandBuildError, CommandParts, HostCommandBuilder},
    config::{DEFAULT_PWSH_FLAGS, HostConfig},
    driver,
    protocol::{HostEvent, HostRequest, ProtocolError, ProtocolPeer},
    shell::find_pwsh,
};

/// Host process error.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("PowerShell executable not found")]
    PwshNotFound,
    #[error("Command build error: {0}")]
    CommandBuild(#[from] CommandBuildError),
    #[error("Failed to spawn host process: {0}")]
    Spawn(std::io::Error),
    #[error("Host process has no {0} pipe")]
    MissingPipe(&'static str),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Host fault: {0}")]
    Fault(String),
    #[error("Host process exited")]
    Exited,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<HostError> for RemoteExecutionError {
    fn from(err: HostError) -> Self {
        Self::Host(err.to_string())
    }
}

/// Creates runspaces by spawning one `pwsh` driver process each.
#[derive(Debug, Clone, Default)]
pub struct PwshRunspaceFactory {
    config: HostConfig,
}

impl PwshRunspaceFactory {
    #[must_use]
    pub const fn new(config: HostConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RunspaceFactory for PwshRunspaceFactory {
    async fn open(&self) -> Result<Box<dyn Runspace>, RemoteExecutionError> {
        let runspace = PwshRunspace::spawn(&self.config).await?;
        Ok(Box::new(runspace))
    }
}

/// A runspace living inside a `pwsh` child process.
///
/// The process group is killed when the runspace is dropped without `close`.
pub struct PwshRunspace {
    peer: ProtocolPeer,
    child: Mutex<Option<AsyncGroupChild>>,
    closed: AtomicBool,
    close_timeout: Duration,
}

impl PwshRunspace {
    /// Spawn the driver process.
    ///
    /// # Errors
    /// Returns error if `pwsh` cannot be found or started.
    pub async fn spawn(config: &HostConfig) -> Result<Self, HostError> {
        let (program, args) = launch_command(config).await?.into_resolved().await?;

        tracing::debug!(program = %program.display(), "Starting PowerShell host");

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.group_spawn().map_err(HostError::Spawn)?;
        let stdin = child.inner().stdin.take().ok_or(HostError::MissingPipe("stdin"))?;
        let stdout = child.inner().stdout.take().ok_or(HostError::MissingPipe("stdout"))?;
        if let Some(stderr) = child.inner().stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        Ok(Self {
            peer: ProtocolPeer::spawn(stdin, stdout),
            child: Mutex::new(Some(child)),
            closed: AtomicBool::new(false),
            close_timeout: config.close_timeout,
        })
    }

    async fn kill(&self) -> Result<(), HostError> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        child.kill().await.map_err(HostError::Io)
    }

    async fn wait_for_exit(&self) -> Result<(), HostError> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        match tokio::time::timeout(self.close_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(%status, "PowerShell host exited");
                Ok(())
            }
            Ok(Err(e)) => Err(HostError::Io(e)),
            Err(_) => {
                tracing::warn!("PowerShell host did not exit in time, killing it");
                child.kill().await.map_err(HostError::Io)
            }
        }
    }
}

/// Launch command with the driver appended as `-EncodedCommand`.
async fn launch_command(config: &HostConfig) -> Result<CommandParts, HostError> {
    let driver_params = ["-EncodedCommand".to_string(), driver::encoded_command()];
    match &config.command {
        Some(base) => Ok(HostCommandBuilder::new(base.clone())
            .params(driver_params)
            .build()?),
        None => {
            let pwsh = find_pwsh().await.ok_or(HostError::PwshNotFound)?;
            let args = DEFAULT_PWSH_FLAGS
                .iter()
                .map(ToString::to_string)
                .chain(driver_params)
                .collect();
            Ok(CommandParts::new(pwsh.to_string_lossy().into_owned(), args))
        }
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "psremote_host::stderr", "{line}");
    }
}

#[async_trait]
impl Runspace for PwshRunspace {
    async fn invoke(
        &self,
        invocation: Invocation,
        progress: &dyn ProgressHandler,
    ) -> Result<ExecutionResult, RemoteExecutionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RemoteExecutionError::ContextClosed);
        }

        let id = Uuid::new_v4().to_string();
        let pending = self.peer.pending();
        let mut events = pending.register(&id).await;
        if let Err(e) = self.peer.send(&HostRequest::invoke(id.clone(), &invocation)).await {
            pending.unregister(&id).await;
            return Err(HostError::from(e).into());
        }

        let outcome = loop {
            match events.recv().await {
                Some(HostEvent::Progress { percent, .. }) => {
                    if let Some(percent) = clamp_percent(percent) {
                        progress.on_progress(percent);
                    }
                }
                Some(HostEvent::Completed { output, errors, .. }) => {
                    break Ok(ExecutionResult::new(output, errors));
                }
                Some(HostEvent::Fault { message, .. }) => break Err(HostError::Fault(message)),
                Some(HostEvent::Closed { .. }) | None => break Err(HostError::Exited),
            }
        };

        pending.unregister(&id).await;
        match outcome {
            Err(HostError::Exited) if self.closed.load(Ordering::SeqCst) => {
                Err(RemoteExecutionError::ContextClosed)
            }
            other => other.map_err(Into::into),
        }
    }

    /// Shut the host down. A request still running is aborted: its waiter is
    /// released with `ContextClosed` and the process is killed instead of
    /// being asked to exit.
    async fn close(&self) -> Result<(), RemoteExecutionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let pending = self.peer.pending();
        if !pending.is_empty().await {
            tracing::info!("Aborting in-flight PowerShell request");
            pending.abandon().await;
            return self.kill().await.map_err(Into::into);
        }
        if let Err(e) = self.peer.send(&HostRequest::Close { id: Uuid::new_v4().to_string() }).await {
            tracing::debug!("Failed to send close to PowerShell host: {e}");
        }
        self.wait_for_exit().await.map_err(Into::into)
    }
}

impl Drop for PwshRunspace {
    fn drop(&mut self) {
        if let Some(child) = self.child.get_mut().as_mut() {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Failed to kill PowerShell host: {e}");
            }
        }
    }
}
