//! Remote session lifecycle and file operations.
//!
//! Provides:
//! - `SessionManager` - Open and close one session per endpoint and run file operations in it

pub mod manager;

pub use manager::{DEFAULT_ROOT, SessionManager};
