//! PowerShell host process backing the execution context.
//!
//! Provides:
//! - `PwshRunspaceFactory` / `PwshRunspace` - Runspaces living in a `pwsh` child process
//! - The line-delimited JSON protocol spoken with the embedded driver script
//! - Executable discovery and launch command building

pub mod command;
pub mod config;
pub mod driver;
pub mod protocol;
pub mod runspace;
pub mod shell;

pub use command::{CommandBuildError, CommandParts, HostCommandBuilder};
pub use config::HostConfig;
pub use protocol::{HostEvent, HostRequest, ProtocolPeer};
pub use runspace::{HostError, PwshRunspace, PwshRunspaceFactory};
pub use shell::{find_pwsh, resolve_executable_path};
