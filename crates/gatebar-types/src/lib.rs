//! Shared types for gatebar components.
//!
//! This crate provides the values exchanged between the broker and the
//! status-bar query client: the simplified VPN connection status and the
//! command vocabulary of the status-query channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reply to a `ping` command
pub const PONG: &str = "pong";

/// Reply to a `goodbye` command
pub const GOODBYE: &str = "goodbye";

/// Simplified VPN connection status republished to status-bar clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Waiting for the user to complete the SAML login
    Login,
    /// Login accepted, tunnel being established
    Connecting,
    /// Tunnel established
    Connected,
    /// The daemon reported an error
    Error,
    /// No poll yet, or the daemon answered something unrecognized
    #[default]
    Unknown,
}

impl ConnectionStatus {
    pub const ALL: [ConnectionStatus; 5] = [
        ConnectionStatus::Login,
        ConnectionStatus::Connecting,
        ConnectionStatus::Connected,
        ConnectionStatus::Error,
        ConnectionStatus::Unknown,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Login => "login",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Unknown => "unknown",
        }
    }

    /// Map a view name reported by the daemon onto a status.
    ///
    /// Any view the broker does not know about becomes `Unknown`, so the
    /// broker only ever republishes one of the five status strings.
    #[must_use]
    pub fn from_view(view: &str) -> Self {
        match view {
            "login" => ConnectionStatus::Login,
            "connecting" => ConnectionStatus::Connecting,
            "connected" => ConnectionStatus::Connected,
            "error" => ConnectionStatus::Error,
            _ => ConnectionStatus::Unknown,
        }
    }

    /// Only `Connected` stops the login poll.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == ConnectionStatus::Connected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands accepted on the status-query channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryCommand {
    Ping,
    Status,
    Goodbye,
    ExitService,
}

impl QueryCommand {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QueryCommand::Ping => "ping",
            QueryCommand::Status => "status",
            QueryCommand::Goodbye => GOODBYE,
            QueryCommand::ExitService => "exit-service",
        }
    }

    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "ping" => Some(QueryCommand::Ping),
            "status" => Some(QueryCommand::Status),
            GOODBYE => Some(QueryCommand::Goodbye),
            "exit-service" => Some(QueryCommand::ExitService),
            _ => None,
        }
    }

    /// `exit-service` is fire-and-forget; every other command gets a reply.
    #[must_use]
    pub fn expects_reply(self) -> bool {
        self != QueryCommand::ExitService
    }
}

impl fmt::Display for QueryCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(ConnectionStatus::Login.as_str(), "login");
        assert_eq!(ConnectionStatus::Connecting.as_str(), "connecting");
        assert_eq!(ConnectionStatus::Connected.as_str(), "connected");
        assert_eq!(ConnectionStatus::Error.as_str(), "error");
        assert_eq!(ConnectionStatus::Unknown.as_str(), "unknown");
    }

    #[test]
    fn test_status_default_is_unknown() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Unknown);
    }

    #[test]
    fn test_from_view_known_values() {
        for status in ConnectionStatus::ALL {
            assert_eq!(ConnectionStatus::from_view(status.as_str()), status);
        }
    }

    #[test]
    fn test_from_view_unrecognized() {
        assert_eq!(
            ConnectionStatus::from_view("profileSelection"),
            ConnectionStatus::Unknown
        );
        assert_eq!(ConnectionStatus::from_view(""), ConnectionStatus::Unknown);
        assert_eq!(
            ConnectionStatus::from_view("Connected"),
            ConnectionStatus::Unknown
        );
    }

    #[test]
    fn test_only_connected_is_terminal() {
        let terminal: Vec<_> = ConnectionStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![ConnectionStatus::Connected]);
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&ConnectionStatus::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");
        let back: ConnectionStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, ConnectionStatus::Error);
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(QueryCommand::parse("ping"), Some(QueryCommand::Ping));
        assert_eq!(QueryCommand::parse("status"), Some(QueryCommand::Status));
        assert_eq!(QueryCommand::parse("goodbye"), Some(QueryCommand::Goodbye));
        assert_eq!(
            QueryCommand::parse("exit-service"),
            Some(QueryCommand::ExitService)
        );
        assert_eq!(QueryCommand::parse("reboot"), None);
        assert_eq!(QueryCommand::parse("STATUS"), None);
    }

    #[test]
    fn test_command_display_matches_wire() {
        assert_eq!(QueryCommand::ExitService.to_string(), "exit-service");
        assert_eq!(QueryCommand::Goodbye.to_string(), GOODBYE);
    }

    #[test]
    fn test_exit_service_expects_no_reply() {
        assert!(!QueryCommand::ExitService.expects_reply());
        assert!(QueryCommand::Status.expects_reply());
        assert!(QueryCommand::Ping.expects_reply());
        assert!(QueryCommand::Goodbye.expects_reply());
    }

    proptest! {
        #[test]
        fn prop_from_view_is_total(view in ".*") {
            let status = ConnectionStatus::from_view(&view);
            prop_assert!(ConnectionStatus::ALL.contains(&status));
            prop_assert_eq!(status.is_terminal(), view == "connected");
        }
    }
}
