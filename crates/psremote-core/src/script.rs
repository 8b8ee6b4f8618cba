//! Script templates and invocation wrapper synthesis.
//!
//! A script body is source text of the form `{ param($a, $b) <body> }`. It is
//! parsed into a script block at dispatch time by a synthesized wrapper that
//! hands the block to `Invoke-Command`, either inside a session or locally.

/// Variable the session handle is bound to before a session-scoped wrapper runs.
pub const SESSION_VARIABLE: &str = "invokeCommandSession";

/// Variable the argument array is bound to before a session-scoped wrapper runs.
pub const ARGS_VARIABLE: &str = "scriptBlockArgs";

/// Script bodies for the file operations.
pub mod templates {
    pub const RENAME: &str = "{ param($path,$newname) Rename-Item -Path $path -NewName $newname }";
    pub const EXTRACT: &str =
        "{ param($path,$destination) Expand-Archive -Path $path -Destination $destination -Force }";
    pub const REMOVE: &str = "{ param($path) Remove-Item -Path $path }";
    pub const LIST_DIRECTORIES: &str =
        "{ param($path) Get-ChildItem -Path $path -Directory | Select-Object -Expand FullName }";
    pub const LIST_FILES: &str =
        "{ param($path) Get-ChildItem -Path $path -File | Select-Object -Expand FullName }";
}

/// Wrapper that runs `body` inside the session bound to [`SESSION_VARIABLE`].
///
/// The `-ArgumentList` clause is present only when there are arguments to forward.
#[must_use]
pub fn session_wrapper(body: &str, has_args: bool) -> String {
    let args_clause = if has_args {
        format!(" -ArgumentList ${ARGS_VARIABLE}")
    } else {
        String::new()
    };
    format!("$sc = {body}\nInvoke-Command -Session ${SESSION_VARIABLE}{args_clause} -ScriptBlock $sc")
}

/// Wrapper that runs `body` locally, forwarding the wrapper's own positional arguments.
#[must_use]
pub fn local_wrapper(body: &str, has_args: bool) -> String {
    let args_clause = if has_args { " -ArgumentList $args" } else { "" };
    format!("$sc = {body}\nInvoke-Command -ScriptBlock $sc{args_clause}")
}
