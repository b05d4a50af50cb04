//! Gatebar status broker.
//!
//! Supervises the AppGate SDP client service, drives its SAML login over the
//! control socket and answers status-bar queries on a loopback TCP endpoint
//! guarded by a pre-shared key.

pub mod error;
pub mod server;
pub mod session;

pub use error::{BrokerError, Result};
pub use server::{Broker, StopReason, run};
pub use session::{SessionOutcome, serve_session};
