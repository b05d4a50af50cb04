//! Wire protocols for gatebar.
//!
//! This crate speaks two protocols:
//!
//! - [`protocol`], [`transport`] and [`client`]: the JSON-RPC 2.0 dialect of
//!   the AppGate service control socket, framed by CR+LF
//! - [`query`] and [`auth`]: the broker's own status-query channel, framed by
//!   a length prefix and guarded by a pre-shared key
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use gatebar_rpc::RpcClient;
//!
//! # async fn example() -> Result<(), gatebar_rpc::ClientError> {
//! let mut client =
//!     RpcClient::connect_to(Path::new("/run/user/1000/appgate.service.sock"), false).await?;
//!
//! let setup = client.receive_unsolicited().await?;
//! println!("service pushed: {:?}", setup.method);
//!
//! let reply = client.call("ready", Some(serde_json::json!({"autoLogin": true}))).await?;
//! println!("error: {:?}", reply.error);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod protocol;
pub mod query;
pub mod transport;

pub use client::{ClientError, RpcClient};

pub use protocol::{
    INVALID_PARAMS, IgnoredErrorCodes, JSONRPC_VERSION, LoginView, Notification, Request,
    RequestId, Response, RpcError, SamlProfileId,
};

pub use query::{QueryConnection, QueryError, QueryFrame};

pub use transport::{CodecError, CrlfJsonCodec};

pub use gatebar_types::{ConnectionStatus, GOODBYE, PONG, QueryCommand};
