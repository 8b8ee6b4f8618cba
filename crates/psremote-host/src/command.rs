//! Host command building utilities.

use std::path::PathBuf;

use thiserror::Error;

use crate::shell::resolve_executable_path;

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns error if executable not found.
    pub async fn into_resolved(self) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable = resolve_executable_path(&program)
            .await
            .ok_or(CommandBuildError::ExecutableNotFound(program))?;
        Ok((executable, args))
    }
}

/// Builder for the `pwsh` launch command.
#[derive(Debug, Clone)]
pub struct HostCommandBuilder {
    /// Base command line, e.g. `pwsh -NoLogo -NoProfile -NonInteractive`.
    pub base: String,
    /// Extra parameters appended after the base.
    pub params: Vec<String>,
}

impl HostCommandBuilder {
    /// Create a new command builder.
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            params: Vec::new(),
        }
    }

    /// Append parameters.
    #[must_use]
    pub fn params<I>(mut self, more: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params.extend(more.into_iter().map(Into::into));
        self
    }

    /// Split the base command and append the parameters.
    ///
    /// # Errors
    /// Returns error if the base cannot be parsed or is empty.
    pub fn build(&self) -> Result<CommandParts, CommandBuildError> {
        let mut parts = split_command_line(&self.base)?;
        parts.extend(self.params.iter().cloned());

        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }

        let program = parts.remove(0);
        Ok(CommandParts::new(program, parts))
    }
}

fn split_command_line(input: &str) -> Result<Vec<String>, CommandBuildError> {
    #[cfg(windows)]
    {
        let parts = winsplit::split(input);
        if parts.is_empty() {
            Err(CommandBuildError::EmptyCommand)
        } else {
            Ok(parts)
        }
    }

    #[cfg(not(windows))]
    {
        shlex::split(input).ok_or_else(|| CommandBuildError::InvalidBase(input.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_splits_base_and_appends_params() {
        let parts = HostCommandBuilder::new("pwsh -NoLogo -NoProfile")
            .params(["-EncodedCommand", "AAAA"])
            .build()
            .unwrap();
        assert_eq!(parts.program, "pwsh");
        assert_eq!(parts.args, ["-NoLogo", "-NoProfile", "-EncodedCommand", "AAAA"]);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_build_handles_quoted_program() {
        let parts = HostCommandBuilder::new("'/opt/microsoft/power shell/pwsh' -NoLogo")
            .build()
            .unwrap();
        assert_eq!(parts.program, "/opt/microsoft/power shell/pwsh");
        assert_eq!(parts.args, ["-NoLogo"]);
    }

    #[test]
    fn test_build_rejects_empty_base() {
        assert!(HostCommandBuilder::new("   ").build().is_err());
    }

    #[tokio::test]
    async fn test_resolve_missing_executable() {
        let parts = CommandParts::new("psremote-definitely-not-installed".into(), vec![]);
        let err = parts.into_resolved().await.unwrap_err();
        assert!(matches!(err, CommandBuildError::ExecutableNotFound(_)));
    }
}
