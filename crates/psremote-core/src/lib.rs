//! Core abstractions for PowerShell remoting sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `Endpoint` / `Credential` - Target host and secret credential
//! - `CommandRequest` / `ScriptRequest` - Requests and their parameter values
//! - `ExecutionContext` - Dispatch commands and scripts, locally or into a session
//! - `RemoteExecutionError` - The single error type at the core boundary
//! - `Runspace` / `RunspaceFactory` traits for execution environments

pub mod config;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod progress;
pub mod request;
pub mod result;
pub mod script;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::EndpointConfig;
pub use context::ExecutionContext;
pub use endpoint::{AuthenticationMechanism, Credential, Endpoint};
pub use error::RemoteExecutionError;
pub use progress::{NoProgress, ProgressHandler, TracingProgress};
pub use request::{CommandRequest, Invocation, ObjectHandle, ParamValue, ScriptRequest, SessionHandle};
pub use result::{ErrorRecord, ExecutionResult, OutputRecord};
pub use traits::{Runspace, RunspaceFactory};
