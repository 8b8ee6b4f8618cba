//! Command and script requests, and the values they carry.

use serde::{Deserialize, Serialize};

use crate::endpoint::Credential;

/// Opaque id of a live object held by the execution environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Handle of an established remote session.
///
/// Wraps whatever live object the runspace returned from `New-PSSession`; the
/// core never looks inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(ObjectHandle);

impl SessionHandle {
    #[must_use]
    pub const fn new(object: ObjectHandle) -> Self {
        Self(object)
    }

    #[must_use]
    pub const fn object(self) -> ObjectHandle {
        self.0
    }
}

/// A parameter or argument value.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<ParamValue>),
    /// A live object produced by an earlier invocation.
    Object(ObjectHandle),
    Session(SessionHandle),
    Credential(Credential),
}

impl ParamValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u16> for ParamValue {
    fn from(value: u16) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<ObjectHandle> for ParamValue {
    fn from(value: ObjectHandle) -> Self {
        Self::Object(value)
    }
}

impl From<SessionHandle> for ParamValue {
    fn from(value: SessionHandle) -> Self {
        Self::Session(value)
    }
}

impl From<Credential> for ParamValue {
    fn from(value: Credential) -> Self {
        Self::Credential(value)
    }
}

impl From<Vec<Self>> for ParamValue {
    fn from(value: Vec<Self>) -> Self {
        Self::Array(value)
    }
}

/// A named command with ordered keyword parameters.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    name: String,
    parameters: Vec<(String, ParamValue)>,
}

impl CommandRequest {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a keyword parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parameters(&self) -> &[(String, ParamValue)] {
        &self.parameters
    }

    /// Look up a parameter by name (case-insensitive, like PowerShell binding).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.parameters
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

/// Script text plus the variables to bind and positional arguments to pass.
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    text: String,
    variables: Vec<(String, ParamValue)>,
    arguments: Vec<ParamValue>,
}

impl ScriptRequest {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            variables: Vec::new(),
            arguments: Vec::new(),
        }
    }

    /// Bind a named variable in the execution environment before the script runs.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.variables.push((name.into(), value.into()));
        self
    }

    /// Append positional invocation arguments.
    #[must_use]
    pub fn arguments<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ParamValue>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn variables(&self) -> &[(String, ParamValue)] {
        &self.variables
    }

    #[must_use]
    pub fn argument_values(&self) -> &[ParamValue] {
        &self.arguments
    }
}

/// One unit of work handed to a runspace.
#[derive(Debug, Clone)]
pub enum Invocation {
    Command(CommandRequest),
    Script(ScriptRequest),
}

impl Invocation {
    /// Text used to identify this invocation in errors and logs.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Command(c) => c.name(),
            Self::Script(s) => s.text(),
        }
    }
}
