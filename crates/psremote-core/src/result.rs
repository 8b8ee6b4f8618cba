//! Execution results and error records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::RemoteExecutionError, request::ObjectHandle};

/// Fallback text for an error entry that carries neither details nor an exception.
pub const NO_ERROR_MESSAGE: &str = "PSRemotingExplorer: No error message available";

/// One emitted output object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// JSON projection of the object.
    pub value: Value,
    /// Set when the object is live (not a primitive) and stays addressable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<ObjectHandle>,
}

impl OutputRecord {
    /// A primitive record with no live object behind it.
    #[must_use]
    pub const fn value(value: Value) -> Self {
        Self {
            value,
            handle: None,
        }
    }

    /// A live object record.
    #[must_use]
    pub const fn object(handle: ObjectHandle, value: Value) -> Self {
        Self {
            value,
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// String form of the record, without JSON quoting for strings.
    #[must_use]
    pub fn into_string(self) -> String {
        match self.value {
            Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

/// One entry of the error channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub script_stack_trace: Option<String>,
}

impl ErrorRecord {
    #[must_use]
    pub fn with_details(details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_exception(exception: impl Into<String>) -> Self {
        Self {
            exception: Some(exception.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.script_stack_trace = Some(trace.into());
        self
    }

    /// Most specific description available: details, else exception, else a fixed marker.
    #[must_use]
    pub fn describe(&self) -> String {
        let primary = non_empty(self.details.as_deref()).or_else(|| non_empty(self.exception.as_deref()));
        match (primary, non_empty(self.script_stack_trace.as_deref())) {
            (Some(text), Some(trace)) => format!("{text} at {trace}"),
            (Some(text), None) => text.to_string(),
            (None, _) => NO_ERROR_MESSAGE.to_string(),
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// Output plus error channel of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    pub output: Vec<OutputRecord>,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
}

impl ExecutionResult {
    #[must_use]
    pub const fn new(output: Vec<OutputRecord>, errors: Vec<ErrorRecord>) -> Self {
        Self { output, errors }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Every error entry described on its own line, or `None` when the channel is empty.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(ErrorRecord::describe)
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    /// Convert to the output records, failing if the error channel is non-empty.
    ///
    /// # Errors
    /// Returns `RemoteExecutionError::Failed` naming `script` and `target`.
    pub fn into_output(
        self,
        script: &str,
        target: &str,
    ) -> Result<Vec<OutputRecord>, RemoteExecutionError> {
        match self.error_message() {
            None => Ok(self.output),
            Some(message) => Err(RemoteExecutionError::Failed {
                script: script.to_string(),
                target: target.to_string(),
                message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_describe_prefers_details() {
        let record = ErrorRecord {
            details: Some("disk full".into()),
            exception: Some("IOException".into()),
            script_stack_trace: Some("at <ScriptBlock>, line 1".into()),
        };
        assert_eq!(record.describe(), "disk full at at <ScriptBlock>, line 1");
    }

    #[test]
    fn test_describe_falls_back_to_marker() {
        assert_eq!(ErrorRecord::default().describe(), NO_ERROR_MESSAGE);
        let blank = ErrorRecord::with_details("  ");
        assert_eq!(blank.describe(), NO_ERROR_MESSAGE);
    }

    #[test]
    fn test_composite_message_joins_lines() {
        let result = ExecutionResult::new(
            vec![],
            vec![
                ErrorRecord::with_details("disk full"),
                ErrorRecord::with_exception("IOException: access denied"),
            ],
        );
        let err = result.into_output("Remove-Item", "10.0.0.5").unwrap_err();
        let RemoteExecutionError::Failed { target, message, .. } = &err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(target, "10.0.0.5");
        assert_eq!(message, "disk full\nIOException: access denied");
    }

    #[test]
    fn test_success_passes_output_through() {
        let result = ExecutionResult::new(vec![OutputRecord::value(json!("C:\\data"))], vec![]);
        let output = result.into_output("Get-ChildItem", "localhost").unwrap();
        assert_eq!(output[0].as_str(), Some("C:\\data"));
    }

    #[test]
    fn test_record_deserializes_from_host_json() {
        let record: ErrorRecord = serde_json::from_value(json!({
            "exception": "System.IO.IOException: denied",
            "scriptStackTrace": "at <ScriptBlock>"
        }))
        .unwrap();
        assert_eq!(record.describe(), "System.IO.IOException: denied at at <ScriptBlock>");
    }
}
