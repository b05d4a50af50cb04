//! Supervision and login driving for the AppGate SDP client service.
//!
//! - [`config`]: settings and XDG directories
//! - [`supervisor`]: detect, launch, watch and stop the service process
//! - [`driver`]: startup handshake and `loginSaml` status polling

pub mod config;
pub mod driver;
pub mod supervisor;

mod error;

#[cfg(test)]
mod tests;

pub use config::{Config, DaemonConfig, Directories, LoginConfig, QueryConfig};
pub use driver::{LoginDriver, interpret_login_response};
pub use error::{Error, Result};
pub use supervisor::{DaemonHandle, daemon_already_running, launch, process_running, wait_for_socket};

pub use gatebar_types::*;
