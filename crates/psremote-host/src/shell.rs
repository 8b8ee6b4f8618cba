//! Locating the PowerShell executable.

use std::{
    collections::HashSet,
    env::{join_paths, split_paths},
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

/// Executable names tried, in order, when no explicit program is configured.
#[cfg(windows)]
pub const PWSH_CANDIDATES: &[&str] = &["pwsh.exe", "powershell.exe"];
#[cfg(not(windows))]
pub const PWSH_CANDIDATES: &[&str] = &["pwsh", "pwsh-preview"];

/// Well-known install locations checked when nothing is on PATH.
#[cfg(windows)]
const WELL_KNOWN_PATHS: &[&str] = &[r"C:\Program Files\PowerShell\7\pwsh.exe"];
#[cfg(not(windows))]
const WELL_KNOWN_PATHS: &[&str] = &[
    "/usr/bin/pwsh",
    "/usr/local/bin/pwsh",
    "/opt/microsoft/powershell/7/pwsh",
    "/snap/bin/pwsh",
];

/// Find a PowerShell executable from the candidate names or well-known paths.
pub async fn find_pwsh() -> Option<PathBuf> {
    for candidate in PWSH_CANDIDATES {
        if let Some(found) = resolve_executable_path(candidate).await {
            return Some(found);
        }
    }
    WELL_KNOWN_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// Resolve an executable by name, falling back to a refreshed PATH if needed.
///
/// The search order is:
/// 1. Explicit paths (absolute or containing a separator).
/// 2. The current process PATH via `which`.
/// 3. PATH as seen by a login shell (Unix only).
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    if let Some(found) = which_async(executable, None).await {
        return Some(found);
    }

    let refreshed = login_shell_path().await?;
    let existing = std::env::var_os("PATH").unwrap_or_default();
    let merged = merge_paths(&existing, &refreshed);
    if merged == existing {
        return None;
    }
    tracing::debug!(?refreshed, "Retrying executable lookup with login shell PATH");
    which_async(executable, Some(merged)).await
}

/// Merge two PATH strings into a single, de-duplicated PATH.
#[must_use]
pub fn merge_paths(primary: impl AsRef<OsStr>, secondary: impl AsRef<OsStr>) -> OsString {
    let mut seen = HashSet::<PathBuf>::new();
    let mut merged = Vec::<PathBuf>::new();

    for p in split_paths(primary.as_ref()).chain(split_paths(secondary.as_ref())) {
        if !p.as_os_str().is_empty() && seen.insert(p.clone()) {
            merged.push(p);
        }
    }

    join_paths(merged).unwrap_or_default()
}

async fn which_async(executable: &str, paths: Option<OsString>) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || match paths {
        Some(paths) => {
            let cwd = std::env::current_dir().ok()?;
            which::which_in(executable, Some(paths), cwd).ok()
        }
        None => which::which(executable).ok(),
    })
    .await
    .ok()
    .flatten()
}

#[cfg(not(windows))]
async fn login_shell_path() -> Option<OsString> {
    use std::{process::Stdio, time::Duration};

    use tokio::process::Command;

    const PATH_REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

    let shell = std::env::var_os("SHELL")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute() && p.is_file())
        .unwrap_or_else(|| PathBuf::from("/bin/sh"));

    let mut cmd = Command::new(&shell);
    cmd.arg("-l")
        .arg("-c")
        .arg("printf '%s' \"$PATH\"")
        .env("TERM", "dumb")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let child = cmd.spawn().ok()?;
    let output = match tokio::time::timeout(PATH_REFRESH_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            tracing::debug!(shell = %shell.display(), ?err, "Failed to retrieve PATH from login shell");
            return None;
        }
        Err(_) => {
            tracing::warn!(shell = %shell.display(), "Timed out retrieving PATH from login shell");
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!path.is_empty()).then(|| OsString::from(path))
}

#[cfg(windows)]
async fn login_shell_path() -> Option<OsString> {
    None
}
