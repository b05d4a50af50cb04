//! RPC client for the AppGate service control socket.
//!
//! Calls are strictly sequential: a request is fully written and the next
//! message on the socket is read back as its reply before the client accepts
//! another call. The service does not reliably echo ids, so no correlation is
//! attempted.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::UnixStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::protocol::{Notification, Request, RequestId, Response};
use crate::transport::{CodecError, CrlfJsonCodec};

/// Errors that can occur with the RPC client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to connect to {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("Malformed message envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,
}

/// Timestamp-derived request ids that never repeat or go backwards
#[derive(Debug, Default)]
struct RequestIds {
    last: u64,
}

impl RequestIds {
    // u128 tens of microseconds since epoch fit in u64 for realistic clocks
    #[allow(clippy::cast_possible_truncation)]
    fn next(&mut self) -> RequestId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| (d.as_micros() / 10) as u64)
            .unwrap_or(0);
        self.last = now.max(self.last + 1);
        RequestId::Number(self.last)
    }
}

/// Client owning the single connection to the service control socket
pub struct RpcClient {
    framed: Framed<UnixStream, CrlfJsonCodec>,
    ids: RequestIds,
    trace_traffic: bool,
}

impl RpcClient {
    /// Connect to the service control socket.
    ///
    /// With `trace_traffic` set, every request and incoming message is logged
    /// verbatim at debug level.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Connect` if the socket connection fails.
    pub async fn connect_to(path: &Path, trace_traffic: bool) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| ClientError::Connect {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_stream(stream, trace_traffic))
    }

    #[must_use]
    pub fn from_stream(stream: UnixStream, trace_traffic: bool) -> Self {
        Self {
            framed: Framed::new(stream, CrlfJsonCodec::new()),
            ids: RequestIds::default(),
            trace_traffic,
        }
    }

    /// Send a request and read the next message as its reply.
    ///
    /// Error replies are returned as an `Ok` response carrying `error`; the
    /// caller decides which codes matter.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ConnectionClosed` if the service hangs up before a
    /// full reply arrives, or a codec/envelope error for malformed replies.
    pub async fn call(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Response, ClientError> {
        let request = Request::new(method, params, self.ids.next());

        if self.trace_traffic {
            debug!("<<< {}", serde_json::to_string(&request)?);
        }

        self.framed.send(request).await?;

        let message = self.read_message().await?;
        Ok(serde_json::from_value(message)?)
    }

    /// Read a message pushed by the service without a preceding request.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`RpcClient::call`].
    pub async fn receive_unsolicited(&mut self) -> Result<Notification, ClientError> {
        let message = self.read_message().await?;
        Ok(serde_json::from_value(message)?)
    }

    async fn read_message(&mut self) -> Result<Value, ClientError> {
        match self.framed.next().await {
            Some(Ok(message)) => {
                if self.trace_traffic {
                    debug!(">>> {}", message);
                }
                Ok(message)
            }
            Some(Err(CodecError::Truncated(_))) | None => Err(ClientError::ConnectionClosed),
            Some(Err(CodecError::Io(e))) => Err(ClientError::Io(e)),
            Some(Err(e)) => Err(ClientError::Codec(e)),
        }
    }
}
