//! Status broker main loop.
//!
//! The broker owns the service process, the control-socket connection (via
//! the login driver) and the status-query listener. Sessions are served one
//! at a time on the main task; the only state shared with another task is
//! the service liveness flag maintained by the supervisor's monitor.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use gatebar_core::supervisor::remove_stale_socket;
use gatebar_core::{
    Config, DaemonHandle, LoginDriver, daemon_already_running, launch, wait_for_socket,
};
use gatebar_rpc::{QueryConnection, RpcClient, SamlProfileId};
use tokio::net::TcpListener;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::{debug, error, info, warn};

use crate::error::{BrokerError, Result};
use crate::session::{SessionOutcome, serve_session};

/// How long a failed login poll waits for the service to be reported dead
const EXIT_GRACE: Duration = Duration::from_secs(1);

/// Why the main loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A client sent `exit-service`
    ExitRequested,
    /// The service process exited on its own
    ServiceExited,
    /// The control socket file disappeared
    SocketVanished,
    /// SIGINT or SIGTERM
    Signal,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::ExitRequested => "exit requested",
            StopReason::ServiceExited => "service exited",
            StopReason::SocketVanished => "control socket vanished",
            StopReason::Signal => "signal received",
        })
    }
}

/// SIGINT and SIGTERM listeners, installed once for the life of the loop.
/// Signals that arrive between two awaits stay queued until the next `recv`.
struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Resolve on the next SIGINT or SIGTERM. Cancel safe.
    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("Received SIGINT"),
            _ = self.terminate.recv() => info!("Received SIGTERM"),
        }
    }
}

pub struct Broker {
    listener: TcpListener,
    driver: LoginDriver,
    daemon: DaemonHandle,
    profile: SamlProfileId,
    control_socket: PathBuf,
    key: Vec<u8>,
}

impl Broker {
    /// Assemble a broker from already-started parts.
    #[must_use]
    pub fn new(
        listener: TcpListener,
        driver: LoginDriver,
        daemon: DaemonHandle,
        profile: SamlProfileId,
        control_socket: PathBuf,
        key: Vec<u8>,
    ) -> Self {
        Self {
            listener,
            driver,
            daemon,
            profile,
            control_socket,
            key,
        }
    }

    /// Launch the service, run the startup handshake and open the listener.
    ///
    /// Returns `Ok(None)` when the service is already running outside our
    /// control; there is then nothing for this broker to supervise.
    ///
    /// # Errors
    ///
    /// Fails fast on any launch, startup, handshake or bind failure. A service
    /// that was launched is killed again when the error drops its handle.
    pub async fn start(config: &Config) -> Result<Option<Self>> {
        let daemon_config = &config.daemon;
        if daemon_already_running(daemon_config) {
            return Ok(None);
        }

        let daemon = launch(daemon_config, config.debug).await?;
        wait_for_socket(
            &daemon,
            &daemon_config.socket_path,
            daemon_config.startup_poll_interval(),
            daemon_config.startup_timeout(),
        )
        .await?;

        let client = RpcClient::connect_to(&daemon_config.socket_path, config.debug).await?;
        let mut driver = LoginDriver::new(client, &config.login);
        let profile = driver.bootstrap().await?;

        let addr = config.query.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| BrokerError::Bind { addr, source })?;

        Ok(Some(Self::new(
            listener,
            driver,
            daemon,
            profile,
            daemon_config.socket_path.clone(),
            config.query.key_bytes().to_vec(),
        )))
    }

    /// Address the status-query listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve status queries until the service goes away or is told to exit.
    ///
    /// Each iteration re-polls the login state unless already connected, then
    /// serves one session to completion. The service dying while the broker
    /// waits for a client ends the loop; it never interrupts a session. SIGINT
    /// and SIGTERM are honoured at every await point, including mid-session.
    ///
    /// # Errors
    ///
    /// Returns an error if a login poll fails while the service is still
    /// running, or if the signal handlers cannot be installed. The service is
    /// stopped first.
    pub async fn serve(mut self) -> Result<StopReason> {
        let mut signals = ShutdownSignals::install()?;
        info!("Listening for status queries on {}", self.local_addr()?);

        let reason = loop {
            if !self.daemon.is_alive() {
                break StopReason::ServiceExited;
            }
            if !self.control_socket.exists() {
                warn!(
                    "Control socket {} disappeared",
                    self.control_socket.display()
                );
                break StopReason::SocketVanished;
            }

            if !self.driver.is_connected() {
                let polled = tokio::select! {
                    polled = self.driver.poll_login(self.profile) => polled,
                    () = signals.recv() => break StopReason::Signal,
                };
                if let Err(e) = polled {
                    if self.exited_within(EXIT_GRACE).await {
                        debug!("Login poll failed after service exit: {}", e);
                        break StopReason::ServiceExited;
                    }
                    error!("Login poll failed: {}", e);
                    self.shutdown().await;
                    return Err(e.into());
                }
            }

            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Accept error: {}", e);
                        continue;
                    }
                },
                () = self.daemon.wait_exit() => continue,
                () = signals.recv() => break StopReason::Signal,
            };

            debug!("Status query connection from {}", peer);
            let accepted = tokio::select! {
                accepted = QueryConnection::accept(stream, &self.key) => accepted,
                () = signals.recv() => break StopReason::Signal,
            };
            let mut conn = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Rejected status query client {}: {}", peer, e);
                    continue;
                }
            };

            let outcome = tokio::select! {
                outcome = serve_session(&mut conn, self.driver.status()) => outcome,
                () = signals.recv() => break StopReason::Signal,
            };
            if outcome == SessionOutcome::ExitService {
                break StopReason::ExitRequested;
            }
        };

        info!("Stopping broker: {}", reason);
        self.shutdown().await;
        Ok(reason)
    }

    /// Whether the service has exited or does so within `grace`.
    async fn exited_within(&mut self, grace: Duration) -> bool {
        !self.daemon.is_alive()
            || tokio::time::timeout(grace, self.daemon.wait_exit())
                .await
                .is_ok()
    }

    /// Close the listener, stop the service and clear its control socket.
    async fn shutdown(self) {
        let Broker {
            listener,
            driver,
            daemon,
            control_socket,
            ..
        } = self;

        drop(listener);
        drop(driver);
        daemon.terminate().await;
        remove_stale_socket(&control_socket);
    }
}

/// Start the broker and serve until it stops.
///
/// # Errors
///
/// Returns an error if startup fails or the main loop aborts.
pub async fn run(config: &Config) -> Result<()> {
    let Some(broker) = Broker::start(config).await? else {
        info!("service already started");
        return Ok(());
    };

    let reason = broker.serve().await?;
    info!("Broker stopped: {}", reason);
    Ok(())
}
