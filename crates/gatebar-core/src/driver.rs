//! Login/status driver for the AppGate service.
//!
//! After the startup handshake the driver polls `loginSaml` and folds each
//! reply into a [`ConnectionStatus`]. Only `connected` is terminal; every
//! other status leaves the broker polling.

use gatebar_rpc::{IgnoredErrorCodes, Response, RpcClient, SamlProfileId};
use gatebar_types::ConnectionStatus;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::LoginConfig;
use crate::{Error, Result};

pub struct LoginDriver {
    client: RpcClient,
    auto_login: bool,
    locale: String,
    ignored: IgnoredErrorCodes,
    status: ConnectionStatus,
}

impl LoginDriver {
    #[must_use]
    pub fn new(client: RpcClient, config: &LoginConfig) -> Self {
        Self {
            client,
            auto_login: config.auto_login,
            locale: config.locale.clone(),
            ignored: config.ignored_codes(),
            status: ConnectionStatus::Unknown,
        }
    }

    /// Run the startup handshake and return the selected SAML profile.
    ///
    /// The service pushes its setup state as soon as a client connects; the
    /// profile id is taken from that push before `ready` and `setLocale` are
    /// sent. Remote errors from those two calls are logged and otherwise
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::SamlProfileMissing` if the push carries no profile id,
    /// or `Error::Client` if the control socket fails.
    pub async fn bootstrap(&mut self) -> Result<SamlProfileId> {
        let push = self.client.receive_unsolicited().await?;
        let profile = push.saml_profile_id().map_err(Error::SamlProfileMissing)?;
        info!("Using SAML profile {}", profile);

        let reply = self
            .client
            .call("ready", Some(json!({ "autoLogin": self.auto_login })))
            .await?;
        self.log_remote_error("ready", &reply);

        let reply = self
            .client
            .call("setLocale", Some(json!({ "locale": self.locale })))
            .await?;
        self.log_remote_error("setLocale", &reply);

        Ok(profile)
    }

    /// Ask the service for the login state of `profile` and remember it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Client` if the control socket fails. Errors reported by
    /// the service itself become `ConnectionStatus::Error`.
    pub async fn poll_login(&mut self, profile: SamlProfileId) -> Result<ConnectionStatus> {
        let reply = self
            .client
            .call("loginSaml", Some(json!({ "profile": profile })))
            .await?;

        let status = interpret_login_response(&reply, &self.ignored);
        if status == self.status {
            debug!("Login status still {}", status);
        } else {
            info!("Login status {} -> {}", self.status, status);
            self.status = status;
        }
        Ok(status)
    }

    /// Last status computed by [`LoginDriver::poll_login`]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status.is_terminal()
    }

    fn log_remote_error(&self, method: &str, reply: &Response) {
        if let Some(err) = &reply.error {
            if self.ignored.is_ignored(err) {
                debug!("{} returned ignored error: {}", method, err);
            } else {
                error!("{} failed: {}", method, err);
            }
        }
    }
}

/// Map a `loginSaml` reply to a status.
///
/// An error reply is `Error` whether or not its code is ignored; the ignore
/// list only silences the log line. A reply without `params` is `Unknown`.
#[must_use]
pub fn interpret_login_response(reply: &Response, ignored: &IgnoredErrorCodes) -> ConnectionStatus {
    if let Some(err) = &reply.error {
        if ignored.is_ignored(err) {
            debug!("loginSaml returned ignored error: {}", err);
        } else {
            error!("loginSaml failed: {}", err);
        }
        return ConnectionStatus::Error;
    }

    match reply.login_view() {
        Ok(Some(view)) => ConnectionStatus::from_view(&view.view),
        Ok(None) => ConnectionStatus::Unknown,
        Err(e) => {
            warn!("Unexpected loginSaml payload: {}", e);
            ConnectionStatus::Unknown
        }
    }
}
