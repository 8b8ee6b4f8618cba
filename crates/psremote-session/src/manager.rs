//! Session manager for one remote endpoint.

use std::sync::{Arc, Mutex as StdMutex};

use psremote_core::{
    CommandRequest, Endpoint, ExecutionContext, NoProgress, ObjectHandle, OutputRecord, ParamValue,
    ProgressHandler, RemoteExecutionError, Runspace, RunspaceFactory, SessionHandle,
    script::templates,
};
use tokio::sync::Mutex;

/// Directory the explorer lists right after connecting.
pub const DEFAULT_ROOT: &str = r"C:\";

/// Session idle timeout: 20 minutes, in milliseconds as `New-PSSessionOption` takes it.
const IDLE_TIMEOUT_MS: i64 = 20 * 60 * 1000;

/// Zero disables the per-operation timeout.
const OPERATION_TIMEOUT_UNLIMITED: i64 = 0;

/// Characters Windows rejects in a file or folder name.
const INVALID_NAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// An open execution context plus the session created through it.
struct Connected {
    context: ExecutionContext,
    session: SessionHandle,
}

/// Owns the endpoint and at most one open session to it.
///
/// Disconnected → `open` → Connected → `close` → Disconnected. Every operation
/// takes the same lock, so at most one runs against the session at a time.
/// `close` does not wait for that lock before shutting the runspace down, so it
/// aborts an operation still in flight.
pub struct SessionManager<F>
where
    F: RunspaceFactory,
{
    endpoint: Endpoint,
    factory: F,
    progress: Arc<dyn ProgressHandler>,
    state: Mutex<Option<Connected>>,
    shutdown: StdMutex<Option<Arc<dyn Runspace>>>,
}

impl<F> SessionManager<F>
where
    F: RunspaceFactory,
{
    /// Create a new, disconnected session manager.
    #[must_use]
    pub fn new(endpoint: Endpoint, factory: F) -> Self {
        Self {
            endpoint,
            factory,
            progress: Arc::new(NoProgress),
            state: Mutex::new(None),
            shutdown: StdMutex::new(None),
        }
    }

    /// Set the handler receiving command progress for contexts opened afterwards.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Open the execution context and the remote session.
    ///
    /// # Errors
    /// Returns `AlreadyConnected` if a session is open. Any other failure
    /// releases the partially opened context and leaves the manager disconnected.
    pub async fn open(&self) -> Result<(), RemoteExecutionError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(RemoteExecutionError::AlreadyConnected);
        }

        let mut context = ExecutionContext::open(&self.factory, self.endpoint.host())
            .await?
            .with_progress(Arc::clone(&self.progress));

        match self.create_session(&context).await {
            Ok(session) => {
                tracing::info!(
                    host = %self.endpoint.host(),
                    port = self.endpoint.port(),
                    authentication = %self.endpoint.authentication(),
                    "Remote session opened"
                );
                if let Ok(mut shutdown) = self.shutdown.lock() {
                    *shutdown = context.shutdown_handle();
                }
                *state = Some(Connected { context, session });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(host = %self.endpoint.host(), "Failed to open remote session: {e}");
                if let Err(close_err) = context.close().await {
                    tracing::debug!("Failed to release execution context: {close_err}");
                }
                Err(e)
            }
        }
    }

    async fn create_session(
        &self,
        context: &ExecutionContext,
    ) -> Result<SessionHandle, RemoteExecutionError> {
        let options_cmd = CommandRequest::new("New-PSSessionOption")
            .param("OperationTimeout", OPERATION_TIMEOUT_UNLIMITED)
            .param("IdleTimeout", IDLE_TIMEOUT_MS);
        let options = single_object("New-PSSessionOption", context.run_command(options_cmd).await?)?;

        let session_cmd = CommandRequest::new("New-PSSession")
            .param("ComputerName", self.endpoint.host())
            .param("Port", self.endpoint.port())
            .param("Authentication", self.endpoint.authentication().as_str())
            .param("Credential", self.endpoint.credential())
            .param("SessionOption", options);
        let session = single_object("New-PSSession", context.run_command(session_cmd).await?)?;

        Ok(SessionHandle::new(session))
    }

    /// Close the session and its execution context.
    ///
    /// An operation still in flight fails instead of delaying the close.
    /// A no-op when no session is open.
    ///
    /// # Errors
    /// Returns error if the context fails to shut down; the manager is disconnected either way.
    pub async fn close(&self) -> Result<(), RemoteExecutionError> {
        let aborted = match self.take_shutdown_handle() {
            Some(runspace) => runspace.close().await,
            None => Ok(()),
        };
        let Some(mut connected) = self.state.lock().await.take() else {
            tracing::debug!("close called without an open session");
            return aborted;
        };
        let closed = connected.context.close().await;
        tracing::info!(host = %self.endpoint.host(), "Remote session closed");
        aborted.and(closed)
    }

    fn take_shutdown_handle(&self) -> Option<Arc<dyn Runspace>> {
        self.shutdown.lock().ok().and_then(|mut handle| handle.take())
    }

    /// Upload `local_path` into the session at `remote_path`.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session, `Failed` if the copy reports errors.
    pub async fn copy_in(&self, remote_path: &str, local_path: &str) -> Result<(), RemoteExecutionError> {
        self.copy(local_path, remote_path, "ToSession").await
    }

    /// Download `remote_path` from the session to `local_path`.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session, `Failed` if the copy reports errors.
    pub async fn copy_out(&self, remote_path: &str, local_path: &str) -> Result<(), RemoteExecutionError> {
        self.copy(remote_path, local_path, "FromSession").await
    }

    async fn copy(
        &self,
        path: &str,
        destination: &str,
        session_param: &str,
    ) -> Result<(), RemoteExecutionError> {
        let state = self.state.lock().await;
        let connected = state.as_ref().ok_or(RemoteExecutionError::NotConnected)?;

        let command = CommandRequest::new("Copy-Item")
            .param("Path", path)
            .param("Destination", destination)
            .param(session_param, connected.session);
        tracing::debug!(path, destination, session_param, "Copying item");
        connected.context.run_command(command).await?;
        Ok(())
    }

    /// Rename a remote item. Renaming an item to its current name succeeds without a round-trip.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a name Windows would reject or silently alter:
    /// empty, containing a separator or reserved character, or ending in a space or dot.
    pub async fn rename(&self, remote_path: &str, new_name: &str) -> Result<(), RemoteExecutionError> {
        if !is_valid_name(new_name) {
            return Err(RemoteExecutionError::InvalidArgument(format!(
                "invalid new name: {new_name:?}"
            )));
        }
        if leaf_name(remote_path).eq_ignore_ascii_case(new_name) {
            self.ensure_connected().await?;
            return Ok(());
        }
        self.run_in_session(templates::RENAME, vec![remote_path.into(), new_name.into()])
            .await
            .map(drop)
    }

    /// Delete a remote item.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session, `Failed` if the removal reports errors.
    pub async fn remove(&self, remote_path: &str) -> Result<(), RemoteExecutionError> {
        self.run_in_session(templates::REMOVE, vec![remote_path.into()])
            .await
            .map(drop)
    }

    /// Extract an archive into a remote folder, overwriting existing files.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session, `Failed` if extraction reports errors.
    pub async fn extract_archive(
        &self,
        remote_archive_path: &str,
        remote_destination_folder: &str,
    ) -> Result<(), RemoteExecutionError> {
        self.run_in_session(
            templates::EXTRACT,
            vec![remote_archive_path.into(), remote_destination_folder.into()],
        )
        .await
        .map(drop)
    }

    /// Extract a `.zip` archive into the folder that contains it.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the path is not a `.zip` file inside a folder.
    pub async fn extract_archive_here(&self, remote_archive_path: &str) -> Result<(), RemoteExecutionError> {
        if !is_zip(remote_archive_path) {
            return Err(RemoteExecutionError::InvalidArgument(format!(
                "not a zip archive: {remote_archive_path}"
            )));
        }
        let folder = parent_folder(remote_archive_path).ok_or_else(|| {
            RemoteExecutionError::InvalidArgument(format!(
                "archive has no parent folder: {remote_archive_path}"
            ))
        })?;
        self.extract_archive(remote_archive_path, &folder).await
    }

    /// Run an arbitrary script template inside the session.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session, `Failed` if the script reports errors.
    pub async fn run_script(
        &self,
        script_body: &str,
        args: Vec<ParamValue>,
    ) -> Result<Vec<OutputRecord>, RemoteExecutionError> {
        self.run_in_session(script_body, args).await
    }

    /// Full paths of the child directories of `path`.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session, `Failed` if the listing reports errors.
    pub async fn list_directories(&self, path: &str) -> Result<Vec<String>, RemoteExecutionError> {
        self.list(templates::LIST_DIRECTORIES, path).await
    }

    /// Full paths of the files directly inside `path`.
    ///
    /// # Errors
    /// Returns `NotConnected` without a session, `Failed` if the listing reports errors.
    pub async fn list_files(&self, path: &str) -> Result<Vec<String>, RemoteExecutionError> {
        self.list(templates::LIST_FILES, path).await
    }

    async fn list(&self, template: &str, path: &str) -> Result<Vec<String>, RemoteExecutionError> {
        let records = self.run_in_session(template, vec![path.into()]).await?;
        Ok(records.into_iter().map(OutputRecord::into_string).collect())
    }

    async fn run_in_session(
        &self,
        script_body: &str,
        args: Vec<ParamValue>,
    ) -> Result<Vec<OutputRecord>, RemoteExecutionError> {
        let state = self.state.lock().await;
        let connected = state.as_ref().ok_or(RemoteExecutionError::NotConnected)?;
        connected
            .context
            .run_script(script_body, args, Some(connected.session))
            .await
    }

    async fn ensure_connected(&self) -> Result<(), RemoteExecutionError> {
        if self.is_connected().await {
            Ok(())
        } else {
            Err(RemoteExecutionError::NotConnected)
        }
    }
}

/// Require exactly one live object from a bootstrap command.
fn single_object(
    command: &str,
    records: Vec<OutputRecord>,
) -> Result<ObjectHandle, RemoteExecutionError> {
    match records.as_slice() {
        [OutputRecord {
            handle: Some(handle),
            ..
        }] => Ok(*handle),
        _ => Err(RemoteExecutionError::UnexpectedOutput {
            command: command.to_string(),
            expected: 1,
            actual: records.iter().filter(|r| r.handle.is_some()).count(),
        }),
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty()
        && !name.ends_with([' ', '.'])
        && !name.contains(INVALID_NAME_CHARS)
        && !name.chars().any(char::is_control)
}

fn leaf_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['\\', '/']);
    trimmed.rsplit(['\\', '/']).next().unwrap_or(trimmed)
}

fn parent_folder(path: &str) -> Option<String> {
    let idx = path.rfind(['\\', '/'])?;
    let parent = &path[..idx];
    if parent.is_empty() {
        return None;
    }
    // Keep the separator for drive roots ("C:" alone means the current directory on C).
    if parent.ends_with(':') {
        Some(path[..=idx].to_string())
    } else {
        Some(parent.to_string())
    }
}

fn is_zip(path: &str) -> bool {
    let leaf = leaf_name(path);
    leaf.rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case("zip"))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeSet,
        sync::{Arc, Mutex as StdMutex},
        time::Duration,
    };

    use psremote_core::{
        AuthenticationMechanism, ErrorRecord, ExecutionResult, Invocation,
        mock::{MockHost, MockRunspaceFactory},
        script::{ARGS_VARIABLE, SESSION_VARIABLE},
    };
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new(
            "10.0.0.5",
            5986,
            "admin",
            SecretString::from("P@ssw0rd"),
            AuthenticationMechanism::Basic,
        )
    }

    fn manager(host: &Arc<MockHost>) -> SessionManager<MockRunspaceFactory> {
        SessionManager::new(endpoint(), host.factory())
    }

    fn script_args(invocation: &Invocation) -> Vec<String> {
        let Invocation::Script(req) = invocation else {
            return Vec::new();
        };
        req.variables()
            .iter()
            .find(|(name, _)| name == ARGS_VARIABLE)
            .and_then(|(_, value)| match value {
                ParamValue::Array(items) => Some(
                    items
                        .iter()
                        .filter_map(ParamValue::as_str)
                        .map(ToString::to_string)
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_open_issues_session_option_then_session() {
        let host = MockHost::new();
        let mgr = manager(&host);
        mgr.open().await.unwrap();
        assert!(mgr.is_connected().await);

        let invocations = host.invocations();
        assert_eq!(invocations.len(), 2);

        let Invocation::Command(options) = &invocations[0] else {
            panic!("expected command");
        };
        assert_eq!(options.name(), "New-PSSessionOption");
        assert!(matches!(options.get("OperationTimeout"), Some(ParamValue::Int(0))));
        assert!(matches!(options.get("IdleTimeout"), Some(ParamValue::Int(1_200_000))));

        let Invocation::Command(session) = &invocations[1] else {
            panic!("expected command");
        };
        assert_eq!(session.name(), "New-PSSession");
        assert_eq!(session.get("ComputerName").and_then(ParamValue::as_str), Some("10.0.0.5"));
        assert!(matches!(session.get("Port"), Some(ParamValue::Int(5986))));
        assert_eq!(session.get("Authentication").and_then(ParamValue::as_str), Some("Basic"));
        let Some(ParamValue::Credential(cred)) = session.get("Credential") else {
            panic!("expected credential");
        };
        assert_eq!(cred.username, "admin");
        assert_eq!(cred.password.expose_secret(), "P@ssw0rd");
        // The option object from the first command is threaded into the second.
        assert!(matches!(session.get("SessionOption"), Some(ParamValue::Object(h)) if h.id() == 1));
    }

    #[tokio::test]
    async fn test_open_twice_fails_fast() {
        let host = MockHost::new();
        let mgr = manager(&host);
        assert_ok!(mgr.open().await);
        let err = assert_err!(mgr.open().await);
        assert!(matches!(err, RemoteExecutionError::AlreadyConnected));
        assert_eq!(host.opened(), 1);
        assert_eq!(host.closed(), 0);
    }

    #[tokio::test]
    async fn test_failed_open_releases_context() {
        let host = MockHost::new();
        host.respond_with(|host, invocation| match invocation {
            Invocation::Command(cmd) if cmd.name() == "New-PSSession" => Ok(ExecutionResult::new(
                vec![],
                vec![ErrorRecord::with_details("Access is denied.")],
            )),
            other => host.default_response(other),
        });
        let mgr = manager(&host);

        let err = mgr.open().await.unwrap_err();
        assert!(err.to_string().contains("Access is denied."));
        assert!(!mgr.is_connected().await);
        assert_eq!(host.opened(), 1);
        assert_eq!(host.closed(), 1);

        let err = mgr.copy_in(r"C:\in", "/tmp/file").await.unwrap_err();
        assert!(matches!(err, RemoteExecutionError::NotConnected));
    }

    #[tokio::test]
    async fn test_open_rejects_missing_session_object() {
        let host = MockHost::new();
        host.respond_with(|host, invocation| match invocation {
            Invocation::Command(cmd) if cmd.name() == "New-PSSession" => {
                Ok(ExecutionResult::default())
            }
            other => host.default_response(other),
        });
        let mgr = manager(&host);

        let err = mgr.open().await.unwrap_err();
        assert!(matches!(
            err,
            RemoteExecutionError::UnexpectedOutput { ref command, expected: 1, actual: 0 }
                if command == "New-PSSession"
        ));
        assert_eq!(host.closed(), 1);
    }

    #[tokio::test]
    async fn test_runspace_open_failure_propagates() {
        let host = MockHost::new();
        host.fail_open("pwsh not found");
        let mgr = manager(&host);
        let err = mgr.open().await.unwrap_err();
        assert!(err.is_transport_failure());
        assert!(!mgr.is_connected().await);
    }

    #[tokio::test]
    async fn test_open_close_then_copy_fails() {
        let host = MockHost::new();
        let mgr = manager(&host);
        mgr.open().await.unwrap();
        mgr.close().await.unwrap();

        assert!(!mgr.is_connected().await);
        assert_eq!(host.closed(), 1);
        let err = mgr.copy_in(r"C:\data", "/tmp/a.txt").await.unwrap_err();
        assert!(matches!(err, RemoteExecutionError::NotConnected));
        // Only the two bootstrap commands ever reached the runspace.
        assert_eq!(host.invocations().len(), 2);
    }

    #[tokio::test]
    async fn test_close_when_disconnected_is_noop() {
        let host = MockHost::new();
        let mgr = manager(&host);
        mgr.close().await.unwrap();
        assert_eq!(host.closed(), 0);
    }

    #[tokio::test]
    async fn test_copy_binds_session_direction() {
        let host = MockHost::new();
        let mgr = manager(&host);
        mgr.open().await.unwrap();

        mgr.copy_in(r"C:\upload", "/home/me/report.pdf").await.unwrap();
        mgr.copy_out(r"C:\logs\app.log", "/tmp/app.log").await.unwrap();

        let invocations = host.invocations();
        let Invocation::Command(upload) = &invocations[2] else {
            panic!("expected command");
        };
        assert_eq!(upload.name(), "Copy-Item");
        assert_eq!(upload.get("Path").and_then(ParamValue::as_str), Some("/home/me/report.pdf"));
        assert_eq!(upload.get("Destination").and_then(ParamValue::as_str), Some(r"C:\upload"));
        assert!(matches!(upload.get("ToSession"), Some(ParamValue::Session(s)) if s.object().id() == 2));
        assert!(upload.get("FromSession").is_none());

        let Invocation::Command(download) = &invocations[3] else {
            panic!("expected command");
        };
        assert_eq!(download.get("Path").and_then(ParamValue::as_str), Some(r"C:\logs\app.log"));
        assert_eq!(download.get("Destination").and_then(ParamValue::as_str), Some("/tmp/app.log"));
        assert!(matches!(download.get("FromSession"), Some(ParamValue::Session(_))));
    }

    #[tokio::test]
    async fn test_copy_failure_keeps_session_open() {
        let host = MockHost::new();
        host.respond_with(|host, invocation| match invocation {
            Invocation::Command(cmd) if cmd.name() == "Copy-Item" => Ok(ExecutionResult::new(
                vec![],
                vec![ErrorRecord::with_exception("IOException: access denied")],
            )),
            other => host.default_response(other),
        });
        let mgr = manager(&host);
        mgr.open().await.unwrap();

        let err = mgr.copy_out(r"C:\secret", "/tmp/secret").await.unwrap_err();
        assert!(matches!(err, RemoteExecutionError::Failed { ref target, .. } if target == "localhost"));
        assert!(mgr.is_connected().await);
    }

    #[tokio::test]
    async fn test_extract_archive_scenario() {
        let host = MockHost::new();
        let mgr = manager(&host);
        mgr.open().await.unwrap();

        mgr.extract_archive(r"C:\data\archive.zip", r"C:\data\out").await.unwrap();

        let invocations = host.invocations();
        let Invocation::Script(req) = &invocations[2] else {
            panic!("expected script");
        };
        assert!(req.text().contains(templates::EXTRACT));
        assert!(req.text().contains("-Force"));
        assert!(req.text().contains("-Session $invokeCommandSession -ArgumentList $scriptBlockArgs"));
        assert_eq!(req.variables()[0].0, SESSION_VARIABLE);
        assert_eq!(
            script_args(&invocations[2]),
            [r"C:\data\archive.zip", r"C:\data\out"]
        );
    }

    #[tokio::test]
    async fn test_extract_archive_here() {
        let host = MockHost::new();
        let mgr = manager(&host);
        mgr.open().await.unwrap();

        mgr.extract_archive_here(r"C:\data\Bundle.ZIP").await.unwrap();
        mgr.extract_archive_here(r"C:\root.zip").await.unwrap();
        assert_eq!(script_args(&host.invocations()[2]), [r"C:\data\Bundle.ZIP", r"C:\data"]);
        assert_eq!(script_args(&host.invocations()[3]), [r"C:\root.zip", r"C:\"]);

        let err = mgr.extract_archive_here(r"C:\data\notes.txt").await.unwrap_err();
        assert!(matches!(err, RemoteExecutionError::InvalidArgument(_)));
        assert_eq!(host.invocations().len(), 4);
    }

    #[tokio::test]
    async fn test_remove_and_listing_without_args_clause() {
        let host = MockHost::new();
        host.respond_with(|host, invocation| match invocation {
            Invocation::Script(req) if req.text().contains("-Directory") => Ok(ExecutionResult::new(
                vec![
                    OutputRecord::value(json!(r"C:\Users")),
                    OutputRecord::value(json!(r"C:\Windows")),
                ],
                vec![],
            )),
            other => host.default_response(other),
        });
        let mgr = manager(&host);
        mgr.open().await.unwrap();

        mgr.remove(r"C:\tmp\old.log").await.unwrap();
        let dirs = mgr.list_directories(DEFAULT_ROOT).await.unwrap();
        assert_eq!(dirs, [r"C:\Users", r"C:\Windows"]);

        let invocations = host.invocations();
        assert_eq!(script_args(&invocations[2]), [r"C:\tmp\old.log"]);
        assert_eq!(script_args(&invocations[3]), [DEFAULT_ROOT]);

        let out = mgr.run_script("{ Get-Date }", vec![]).await.unwrap();
        assert!(out.is_empty());
        let Invocation::Script(req) = &host.invocations()[4] else {
            panic!("expected script");
        };
        assert!(!req.text().contains("-ArgumentList"));
    }

    #[tokio::test]
    async fn test_script_error_names_remote_host() {
        let host = MockHost::new();
        host.respond_with(|host, invocation| match invocation {
            Invocation::Script(_) => Ok(ExecutionResult::new(
                vec![],
                vec![
                    ErrorRecord::with_details("disk full"),
                    ErrorRecord::with_exception("IOException: access denied"),
                ],
            )),
            other => host.default_response(other),
        });
        let mgr = manager(&host);
        mgr.open().await.unwrap();

        let err = mgr.remove(r"C:\full\file").await.unwrap_err();
        let RemoteExecutionError::Failed { script, target, message } = &err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(script, templates::REMOVE);
        assert_eq!(target, "10.0.0.5");
        assert!(message.contains("disk full\nIOException: access denied"));
    }

    /// Tiny remote file system answering rename and file listing scripts.
    fn install_fake_fs(host: &MockHost, files: &[&str]) -> Arc<StdMutex<BTreeSet<String>>> {
        let fs = Arc::new(StdMutex::new(
            files.iter().map(ToString::to_string).collect::<BTreeSet<_>>(),
        ));
        let state = Arc::clone(&fs);
        host.respond_with(move |host, invocation| {
            let Invocation::Script(req) = invocation else {
                return host.default_response(invocation);
            };
            let args = script_args(invocation);
            let mut files = state.lock().unwrap();
            if req.text().contains("Rename-Item") {
                let (path, new_name) = (&args[0], &args[1]);
                if !files.remove(path) {
                    return Ok(ExecutionResult::new(
                        vec![],
                        vec![ErrorRecord::with_details(format!("Cannot find path '{path}'"))],
                    ));
                }
                let parent = parent_folder(path).unwrap_or_default();
                files.insert(format!(r"{}\{new_name}", parent.trim_end_matches('\\')));
                Ok(ExecutionResult::default())
            } else if req.text().contains("-File") {
                let prefix = format!(r"{}\", args[0].trim_end_matches('\\'));
                let listed = files
                    .iter()
                    .filter(|f| f.starts_with(&prefix) && !f[prefix.len()..].contains('\\'))
                    .map(|f| OutputRecord::value(json!(f)))
                    .collect();
                Ok(ExecutionResult::new(listed, vec![]))
            } else {
                Ok(ExecutionResult::default())
            }
        });
        fs
    }

    #[tokio::test]
    async fn test_rename_round_trip() {
        let host = MockHost::new();
        install_fake_fs(&host, &[r"C:\data\a.txt", r"C:\data\b.txt"]);
        let mgr = manager(&host);
        mgr.open().await.unwrap();

        mgr.rename(r"C:\data\a.txt", "renamed.txt").await.unwrap();
        let files = mgr.list_files(r"C:\data").await.unwrap();
        assert!(files.contains(&r"C:\data\renamed.txt".to_string()));
        assert!(!files.contains(&r"C:\data\a.txt".to_string()));

        // Renaming to the current name twice is a no-op success.
        let before = host.invocations().len();
        mgr.rename(r"C:\data\renamed.txt", "renamed.txt").await.unwrap();
        mgr.rename(r"C:\data\renamed.txt", "RENAMED.txt").await.unwrap();
        assert_eq!(host.invocations().len(), before);
    }

    #[tokio::test]
    async fn test_rename_validation() {
        let host = MockHost::new();
        let mgr = manager(&host);

        let err = mgr.rename(r"C:\a.txt", "a.txt").await.unwrap_err();
        assert!(matches!(err, RemoteExecutionError::NotConnected));

        mgr.open().await.unwrap();
        for bad in ["", "   ", "name ", "name.", r"sub\name", "x/y", "a:b", "what?"] {
            let err = mgr.rename(r"C:\a.txt", bad).await.unwrap_err();
            assert!(matches!(err, RemoteExecutionError::InvalidArgument(_)), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_operations_are_serialized() {
        let host = MockHost::new();
        let mgr = Arc::new(manager(&host));
        mgr.open().await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let mgr = Arc::clone(&mgr);
                tokio::spawn(async move { mgr.remove(&format!(r"C:\tmp\{i}.log")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(host.invocations().len(), 10);
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(leaf_name(r"C:\data\a.txt"), "a.txt");
        assert_eq!(leaf_name(r"C:\data\dir\"), "dir");
        assert_eq!(parent_folder(r"C:\data\a.zip").as_deref(), Some(r"C:\data"));
        assert_eq!(parent_folder(r"C:\a.zip").as_deref(), Some(r"C:\"));
        assert_eq!(parent_folder("a.zip"), None);
        assert!(is_zip(r"C:\x\A.Zip"));
        assert!(!is_zip(r"C:\x\.zip"));
        assert!(!is_zip(r"C:\x\a.zip.txt"));
    }

    /// Runspace whose scripts never finish on their own; only `close` releases them.
    struct StuckRunspace {
        started: Arc<tokio::sync::Notify>,
        released: tokio::sync::Notify,
        closed: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl Runspace for StuckRunspace {
        async fn invoke(
            &self,
            invocation: Invocation,
            _progress: &dyn ProgressHandler,
        ) -> Result<ExecutionResult, RemoteExecutionError> {
            use std::sync::atomic::Ordering;

            if self.closed.load(Ordering::SeqCst) {
                return Err(RemoteExecutionError::ContextClosed);
            }
            match invocation {
                Invocation::Command(cmd) => {
                    let id = if cmd.name() == "New-PSSession" { 2 } else { 1 };
                    Ok(ExecutionResult::new(
                        vec![OutputRecord::object(ObjectHandle::new(id), json!(cmd.name()))],
                        vec![],
                    ))
                }
                Invocation::Script(_) => {
                    self.started.notify_one();
                    self.released.notified().await;
                    Err(RemoteExecutionError::ContextClosed)
                }
            }
        }

        async fn close(&self) -> Result<(), RemoteExecutionError> {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
            self.released.notify_one();
            Ok(())
        }
    }

    struct StuckFactory {
        started: Arc<tokio::sync::Notify>,
    }

    #[async_trait::async_trait]
    impl RunspaceFactory for StuckFactory {
        async fn open(&self) -> Result<Box<dyn Runspace>, RemoteExecutionError> {
            Ok(Box::new(StuckRunspace {
                started: Arc::clone(&self.started),
                released: tokio::sync::Notify::new(),
                closed: std::sync::atomic::AtomicBool::new(false),
            }))
        }
    }

    #[tokio::test]
    async fn test_close_aborts_in_flight_operation() {
        let started = Arc::new(tokio::sync::Notify::new());
        let mgr = Arc::new(SessionManager::new(
            endpoint(),
            StuckFactory {
                started: Arc::clone(&started),
            },
        ));
        mgr.open().await.unwrap();

        let in_flight = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move { mgr.remove(r"C:\big").await })
        };
        started.notified().await;

        tokio::time::timeout(Duration::from_secs(2), mgr.close())
            .await
            .expect("close waited for the in-flight operation")
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), in_flight)
            .await
            .expect("in-flight operation never returned")
            .unwrap();

        assert!(matches!(result, Err(RemoteExecutionError::ContextClosed)));
        assert!(!mgr.is_connected().await);
        let err = mgr.remove(r"C:\big").await.unwrap_err();
        assert!(matches!(err, RemoteExecutionError::NotConnected));
    }

    #[tokio::test]
    async fn test_close_then_reopen() {
        let host = MockHost::new();
        let mgr = manager(&host);
        mgr.open().await.unwrap();
        mgr.close().await.unwrap();
        mgr.close().await.unwrap();
        mgr.open().await.unwrap();

        assert!(mgr.is_connected().await);
        assert_eq!(host.opened(), 2);
        assert_eq!(host.closed(), 1);
    }
}
