//! Error types for the status broker.

/// Errors that can occur in the broker
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Supervision, configuration or control-socket failure
    #[error("Core error: {0}")]
    Core(#[from] gatebar_core::Error),

    /// Status-query listener could not be opened
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<gatebar_rpc::ClientError> for BrokerError {
    fn from(err: gatebar_rpc::ClientError) -> Self {
        BrokerError::Core(err.into())
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use gatebar_rpc::ClientError;

    #[test]
    fn test_broker_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = BrokerError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_broker_error_display_bind() {
        let err = BrokerError::Bind {
            addr: "127.0.0.1:2345".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to listen on 127.0.0.1:2345: address in use"
        );
    }

    #[test]
    fn test_broker_error_from_core_error() {
        let err: BrokerError = gatebar_core::Error::Startup.into();
        assert!(matches!(err, BrokerError::Core(gatebar_core::Error::Startup)));
        assert!(err.to_string().contains("Service died during startup"));
    }

    #[test]
    fn test_broker_error_from_client_error() {
        let err: BrokerError = ClientError::ConnectionClosed.into();
        assert!(matches!(
            err,
            BrokerError::Core(gatebar_core::Error::Client(ClientError::ConnectionClosed))
        ));
    }
}
