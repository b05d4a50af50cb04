//! Command loop for one authenticated status-query client.

use gatebar_rpc::QueryConnection;
use gatebar_types::{ConnectionStatus, GOODBYE, PONG, QueryCommand};
use tracing::{debug, warn};

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Client said goodbye; keep serving
    Goodbye,
    /// Client asked the broker to stop the service and exit
    ExitService,
    /// Client hung up or the connection failed
    Disconnected,
}

/// Serve commands until the client leaves.
///
/// `status` is the last polled value; reading it has no side effects, so
/// repeated `status` commands get the same answer. Unknown commands and
/// undecodable frames are skipped.
pub async fn serve_session(conn: &mut QueryConnection, status: ConnectionStatus) -> SessionOutcome {
    loop {
        let text = match conn.recv_text().await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("Status query client hung up");
                return SessionOutcome::Disconnected;
            }
            Err(e) if e.is_recoverable() => {
                warn!("Ignoring unreadable frame: {}", e);
                continue;
            }
            Err(e) => {
                warn!("Status query session failed: {}", e);
                return SessionOutcome::Disconnected;
            }
        };

        let Some(command) = QueryCommand::parse(&text) else {
            warn!("Ignoring unknown command {:?}", text);
            continue;
        };
        debug!("Status query command: {}", command);

        let reply = match command {
            QueryCommand::Ping => PONG,
            QueryCommand::Status => status.as_str(),
            QueryCommand::Goodbye => GOODBYE,
            QueryCommand::ExitService => return SessionOutcome::ExitService,
        };

        if let Err(e) = conn.send_text(reply).await {
            warn!("Failed to reply to status query: {}", e);
            return SessionOutcome::Disconnected;
        }
        if command == QueryCommand::Goodbye {
            return SessionOutcome::Goodbye;
        }
    }
}
