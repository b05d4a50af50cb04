//! Status-query channel between the broker and status-bar clients.
//!
//! Frames are length-prefixed JSON objects tagged by `kind`:
//! ```text
//! +----------------+------------------------------+
//! |  4 bytes       |  N bytes                     |
//! |  (length BE)   |  {"kind": "text", ...}       |
//! +----------------+------------------------------+
//! ```
//!
//! A connection is only handed to callers after a mutual challenge/response
//! over the pre-shared key: the accepting side challenges first, then answers
//! the connector's challenge.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, trace};

use crate::auth;

/// Maximum frame size (64 KB)
const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Frames exchanged on the status-query channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryFrame {
    Challenge { nonce: String },
    Digest { mac: String },
    Welcome,
    Failure,
    Text { text: String },
}

impl QueryFrame {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            QueryFrame::Challenge { .. } => "challenge",
            QueryFrame::Digest { .. } => "digest",
            QueryFrame::Welcome => "welcome",
            QueryFrame::Failure => "failure",
            QueryFrame::Text { .. } => "text",
        }
    }
}

/// Errors that can occur on the status-query channel
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame arrived intact but its payload could not be decoded.
    /// The connection remains usable.
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unexpected {0} frame")]
    UnexpectedFrame(&'static str),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Connection closed")]
    Closed,
}

impl QueryError {
    /// Whether the connection can keep being used after this error
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, QueryError::Malformed(_) | QueryError::UnexpectedFrame(_))
    }
}

/// An authenticated status-query connection
pub struct QueryConnection {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl QueryConnection {
    fn new(stream: TcpStream) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_SIZE)
            .new_codec();
        Self {
            framed: Framed::new(stream, codec),
        }
    }

    /// Authenticate an accepted stream (broker side).
    ///
    /// # Errors
    ///
    /// Returns `QueryError::AuthenticationFailed` if either side rejects the
    /// other's key, or an I/O/framing error if the handshake is interrupted.
    pub async fn accept(stream: TcpStream, key: &[u8]) -> Result<Self, QueryError> {
        let mut conn = Self::new(stream);
        conn.deliver_challenge(key).await?;
        conn.answer_challenge(key).await?;
        debug!("Query client authenticated");
        Ok(conn)
    }

    /// Connect to the broker and authenticate (client side).
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Io` if the broker cannot be reached, or
    /// `QueryError::AuthenticationFailed` if the keys differ.
    pub async fn connect(addr: impl ToSocketAddrs, key: &[u8]) -> Result<Self, QueryError> {
        let stream = TcpStream::connect(addr).await?;
        let mut conn = Self::new(stream);
        conn.answer_challenge(key).await?;
        conn.deliver_challenge(key).await?;
        Ok(conn)
    }

    async fn deliver_challenge(&mut self, key: &[u8]) -> Result<(), QueryError> {
        let nonce = auth::new_nonce();
        self.send_frame(&QueryFrame::Challenge {
            nonce: nonce.clone(),
        })
        .await?;

        match self.expect_frame().await? {
            QueryFrame::Digest { mac } if auth::verify(key, &nonce, &mac) => {
                self.send_frame(&QueryFrame::Welcome).await
            }
            QueryFrame::Digest { .. } => {
                self.send_frame(&QueryFrame::Failure).await?;
                Err(QueryError::AuthenticationFailed)
            }
            other => Err(QueryError::UnexpectedFrame(other.kind())),
        }
    }

    async fn answer_challenge(&mut self, key: &[u8]) -> Result<(), QueryError> {
        let QueryFrame::Challenge { nonce } = self.expect_frame().await? else {
            return Err(QueryError::UnexpectedFrame("non-challenge"));
        };
        self.send_frame(&QueryFrame::Digest {
            mac: auth::digest(key, &nonce),
        })
        .await?;

        match self.expect_frame().await? {
            QueryFrame::Welcome => Ok(()),
            QueryFrame::Failure => Err(QueryError::AuthenticationFailed),
            other => Err(QueryError::UnexpectedFrame(other.kind())),
        }
    }

    async fn send_frame(&mut self, frame: &QueryFrame) -> Result<(), QueryError> {
        trace!("send {} frame", frame.kind());
        let payload = serde_json::to_vec(frame)?;
        self.framed.send(Bytes::from(payload)).await?;
        Ok(())
    }

    async fn recv_frame(&mut self) -> Result<Option<QueryFrame>, QueryError> {
        match self.framed.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(e.into()),
            Some(Ok(payload)) => {
                let frame: QueryFrame = serde_json::from_slice(&payload)?;
                trace!("recv {} frame", frame.kind());
                Ok(Some(frame))
            }
        }
    }

    async fn expect_frame(&mut self) -> Result<QueryFrame, QueryError> {
        self.recv_frame().await?.ok_or(QueryError::Closed)
    }

    /// Send a command or reply.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the peer has gone away.
    pub async fn send_text(&mut self, text: &str) -> Result<(), QueryError> {
        self.send_frame(&QueryFrame::Text {
            text: text.to_string(),
        })
        .await
    }

    /// Receive the next command or reply; `Ok(None)` when the peer hung up.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Malformed` or `QueryError::UnexpectedFrame` for a
    /// frame that is not text (the connection stays usable), or an I/O error.
    pub async fn recv_text(&mut self) -> Result<Option<String>, QueryError> {
        match self.recv_frame().await? {
            None => Ok(None),
            Some(QueryFrame::Text { text }) => Ok(Some(text)),
            Some(other) => Err(QueryError::UnexpectedFrame(other.kind())),
        }
    }

    #[cfg(test)]
    async fn send_raw(&mut self, payload: &[u8]) -> Result<(), QueryError> {
        self.framed.send(Bytes::copy_from_slice(payload)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const KEY: &[u8] = b"polybar-appgate-mpc";

    async fn pair(
        server_key: &'static [u8],
        client_key: &'static [u8],
    ) -> (
        Result<QueryConnection, QueryError>,
        Result<QueryConnection, QueryError>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            QueryConnection::accept(stream, server_key).await
        });
        let client = QueryConnection::connect(addr, client_key).await;
        (server.await.unwrap(), client)
    }

    #[test]
    fn test_frame_wire_format() {
        let json = serde_json::to_string(&QueryFrame::Text {
            text: "status".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"text","text":"status"}"#);

        let json = serde_json::to_string(&QueryFrame::Welcome).unwrap();
        assert_eq!(json, r#"{"kind":"welcome"}"#);
    }

    #[test]
    fn test_error_recoverability() {
        let malformed = serde_json::from_str::<QueryFrame>("{}").unwrap_err();
        assert!(QueryError::Malformed(malformed).is_recoverable());
        assert!(QueryError::UnexpectedFrame("welcome").is_recoverable());
        assert!(!QueryError::AuthenticationFailed.is_recoverable());
        assert!(!QueryError::Closed.is_recoverable());
    }

    #[tokio::test]
    async fn test_handshake_and_text_exchange() {
        let (server, client) = pair(KEY, KEY).await;
        let mut server = server.unwrap();
        let mut client = client.unwrap();

        client.send_text("ping").await.unwrap();
        assert_eq!(server.recv_text().await.unwrap().as_deref(), Some("ping"));

        server.send_text("pong").await.unwrap();
        assert_eq!(client.recv_text().await.unwrap().as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn test_wrong_key_rejected() {
        let (server, client) = pair(KEY, b"some-other-key").await;
        assert!(matches!(server, Err(QueryError::AuthenticationFailed)));
        assert!(matches!(client, Err(QueryError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_recv_text_none_after_hangup() {
        let (server, client) = pair(KEY, KEY).await;
        let mut server = server.unwrap();
        drop(client);

        assert!(server.recv_text().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_recoverable() {
        let (server, client) = pair(KEY, KEY).await;
        let mut server = server.unwrap();
        let mut client = client.unwrap();

        client.send_raw(b"\x80\x04garbage").await.unwrap();
        client.send_text("status").await.unwrap();

        let err = server.recv_text().await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(server.recv_text().await.unwrap().as_deref(), Some("status"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = QueryConnection::connect(addr, KEY).await;
        assert!(matches!(result, Err(QueryError::Io(_))));
    }
}
