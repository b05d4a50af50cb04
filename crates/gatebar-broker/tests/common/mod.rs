//! Shared helpers for broker integration tests

#![allow(dead_code)] // Each test binary uses a different subset

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gatebar_broker::{Broker, Result, StopReason};
use gatebar_core::{DaemonConfig, Directories, LoginConfig, LoginDriver, launch};
use gatebar_rpc::{QueryConnection, RpcClient};
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

pub const KEY: &[u8] = b"polybar-appgate-mpc";
pub const WAIT: Duration = Duration::from_secs(5);

const SETUP_PUSH: &str =
    r#"{"method":"setup","params":{"viewData":{"setup":{"selectedProfile":{"id": 7}}}}}"#;

/// In-process stand-in for the service control socket.
///
/// Pushes the setup message, acknowledges `ready`/`setLocale`, and answers
/// every `loginSaml` with the same reply.
pub struct FakeService {
    polls: Arc<AtomicUsize>,
    hang_up: Arc<Notify>,
}

impl FakeService {
    pub fn serve(listener: UnixListener, login_reply: &str) -> Self {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let hang_up = Arc::new(Notify::new());
        let closed = hang_up.clone();
        let login_reply = format!("{login_reply}\r\n");

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();

            write
                .write_all(format!("{SETUP_PUSH}\r\n").as_bytes())
                .await
                .unwrap();

            loop {
                let line = tokio::select! {
                    line = lines.next_line() => line,
                    () = closed.notified() => break,
                };
                let Ok(Some(line)) = line else { break };
                let request: Value = serde_json::from_str(&line).unwrap();
                let reply = if request["method"] == "loginSaml" {
                    counter.fetch_add(1, Ordering::SeqCst);
                    login_reply.as_str()
                } else {
                    "{\"result\":{}}\r\n"
                };
                if write.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        Self { polls, hang_up }
    }

    pub fn bind(path: &Path, login_reply: &str) -> Self {
        Self::serve(UnixListener::bind(path).unwrap(), login_reply)
    }

    /// Close the control connection, as a dying service would
    pub fn hang_up(&self) {
        self.hang_up.notify_one();
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

pub fn view(name: &str) -> String {
    format!(r#"{{"params":{{"view":"{name}"}}}}"#)
}

/// Daemon settings rooted in `dir` whose "service" is a plain sleep
pub fn sleeping_daemon(dir: &Path) -> DaemonConfig {
    let mut config = DaemonConfig::with_dirs(&Directories::with_base(dir.to_path_buf()));
    config.binary = PathBuf::from("/bin/sh");
    config.args = vec!["-c".to_string(), "exec sleep 30".to_string()];
    config.startup_poll_interval_ms = 10;
    config
}

/// Like [`sleeping_daemon`], but the service leaves a helper process behind
/// that keeps its output pipes open after it dies
pub fn forking_daemon(dir: &Path) -> DaemonConfig {
    let mut config = sleeping_daemon(dir);
    config.args = vec!["-c".to_string(), "sleep 10 & exec sleep 30".to_string()];
    config
}

/// A broker serving on an ephemeral port from a background task
pub struct TestBroker {
    pub addr: SocketAddr,
    pub task: JoinHandle<Result<StopReason>>,
    pub liveness: watch::Receiver<bool>,
    pub pid: u32,
    pub socket: PathBuf,
    pub service: FakeService,
    _dir: TempDir,
}

impl TestBroker {
    pub async fn start(login_reply: &str) -> Self {
        Self::start_with(login_reply, sleeping_daemon).await
    }

    pub async fn start_with(login_reply: &str, daemon_config: fn(&Path) -> DaemonConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("appgate.service.sock");
        let service = FakeService::bind(&socket, login_reply);

        let daemon = launch(&daemon_config(dir.path()), false).await.unwrap();
        let liveness = daemon.liveness();
        let pid = daemon.pid().unwrap();

        let client = RpcClient::connect_to(&socket, false).await.unwrap();
        let mut driver = LoginDriver::new(client, &LoginConfig::default());
        let profile = driver.bootstrap().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let broker = Broker::new(
            listener,
            driver,
            daemon,
            profile,
            socket.clone(),
            KEY.to_vec(),
        );
        let addr = broker.local_addr().unwrap();

        Self {
            addr,
            task: tokio::spawn(broker.serve()),
            liveness,
            pid,
            socket,
            service,
            _dir: dir,
        }
    }

    pub async fn connect(&self) -> QueryConnection {
        QueryConnection::connect(self.addr, KEY).await.unwrap()
    }

    pub async fn finished(self) -> StopReason {
        tokio::time::timeout(WAIT, self.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    pub fn kill_service(&self) {
        let status = std::process::Command::new("kill")
            .args(["-9", &self.pid.to_string()])
            .status()
            .unwrap();
        assert!(status.success());
    }
}

pub async fn ask(conn: &mut QueryConnection, command: &str) -> String {
    conn.send_text(command).await.unwrap();
    conn.recv_text().await.unwrap().unwrap()
}
