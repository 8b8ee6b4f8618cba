//! Host process configuration.

use std::time::Duration;

/// Environment variable overriding the `pwsh` command line.
pub const PWSH_COMMAND_ENV: &str = "PSREMOTE_PWSH";

/// Flags passed to an auto-detected `pwsh`.
pub const DEFAULT_PWSH_FLAGS: &[&str] = &["-NoLogo", "-NoProfile", "-NonInteractive"];

/// How long `close` waits for the host process to exit before killing it.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for spawning the PowerShell host process.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Full base command line. `None` auto-detects `pwsh` and adds [`DEFAULT_PWSH_FLAGS`].
    pub command: Option<String>,
    pub close_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            command: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl HostConfig {
    /// Defaults, with the command taken from `PSREMOTE_PWSH` when set.
    #[must_use]
    pub fn from_env() -> Self {
        let command = std::env::var(PWSH_COMMAND_ENV)
            .ok()
            .filter(|c| !c.trim().is_empty());
        Self {
            command,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    #[must_use]
    pub const fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}
