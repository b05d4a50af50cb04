use std::path::PathBuf;
use std::time::Duration;

use gatebar_rpc::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to launch {}: {source}", binary.display())]
    Launch {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Service died during startup")]
    Startup,

    #[error("Service did not create {} within {waited:?}", path.display())]
    StartupTimeout { path: PathBuf, waited: Duration },

    #[error("Control socket error: {0}")]
    Client(#[from] ClientError),

    #[error("SAML profile id not found: {0}")]
    SamlProfileMissing(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_launch() {
        let err = Error::Launch {
            binary: PathBuf::from("/opt/appgate/service/appgateservice"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.to_string().contains("Failed to launch"));
        assert!(err.to_string().contains("appgateservice"));
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_error_display_startup() {
        assert_eq!(Error::Startup.to_string(), "Service died during startup");
    }

    #[test]
    fn test_error_display_startup_timeout() {
        let err = Error::StartupTimeout {
            path: PathBuf::from("/run/user/1000/appgate.service.sock"),
            waited: Duration::from_secs(3),
        };
        assert!(err.to_string().contains("appgate.service.sock"));
        assert!(err.to_string().contains("3s"));
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("query.port must not be 0".to_string());
        assert_eq!(err.to_string(), "Config error: query.port must not be 0");
    }

    #[test]
    fn test_error_from_client_error() {
        let err: Error = ClientError::ConnectionClosed.into();
        assert!(matches!(err, Error::Client(ClientError::ConnectionClosed)));
        assert!(err.to_string().contains("Connection closed"));
    }

    #[test]
    fn test_error_display_saml_profile_missing() {
        let json_err = <serde_json::Error as serde::de::Error>::missing_field("params");
        let err = Error::SamlProfileMissing(json_err);
        assert!(err.to_string().contains("SAML profile id not found"));
        assert!(err.to_string().contains("params"));
    }
}
