//! AppGate service process supervision.
//!
//! The broker owns at most one service process. A monitor task owns the
//! [`Child`], drains its stdout and stderr line-by-line into the daemon log
//! file, and publishes liveness through a `watch` channel that the broker
//! reads from its own task.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::{Error, Result};

/// Output still buffered in the pipes after exit is drained for at most this long
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Check whether any process runs the given executable.
///
/// Scans `/proc/<pid>/exe` links; processes whose links cannot be read (other
/// users, processes exiting mid-scan) are skipped.
#[must_use]
pub fn process_running(binary: &Path) -> bool {
    scan_process_table(Path::new("/proc"), binary)
}

fn scan_process_table(proc_root: &Path, binary: &Path) -> bool {
    let target = std::fs::canonicalize(binary).unwrap_or_else(|_| binary.to_path_buf());
    let Ok(entries) = std::fs::read_dir(proc_root) else {
        return false;
    };

    entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()))
        })
        .filter_map(|entry| std::fs::read_link(entry.path().join("exe")).ok())
        .any(|exe| exe == target)
}

/// Check for a running service, cleaning up after a crashed one.
///
/// When no process runs the configured binary, a control socket left behind
/// by a previous run is removed so the next launch can detect the fresh one.
#[must_use]
pub fn daemon_already_running(config: &DaemonConfig) -> bool {
    if process_running(&config.binary) {
        debug!("Found running {}", config.binary.display());
        return true;
    }
    remove_stale_socket(&config.socket_path);
    false
}

/// Remove a leftover control socket; a missing file is not an error.
pub fn remove_stale_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!("Removed stale control socket {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove control socket {}: {}", path.display(), e),
    }
}

/// Start the service and its output monitor.
///
/// # Errors
///
/// Returns `Error::Io` if the log file cannot be opened and `Error::Launch`
/// if the process cannot be spawned.
pub async fn launch(config: &DaemonConfig, debug: bool) -> Result<DaemonHandle> {
    if let Some(parent) = config.log_file.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .await?;

    let launch_error = |source| Error::Launch {
        binary: config.binary.clone(),
        source,
    };

    let mut child = Command::new(&config.binary)
        .args(config.command_args(debug))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(launch_error)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| launch_error(io::Error::other("stdout not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| launch_error(io::Error::other("stderr not captured")))?;

    let pid = child.id();
    info!("Started {} (pid {:?})", config.binary.display(), pid);

    let (alive_tx, alive_rx) = watch::channel(true);
    let (kill_tx, kill_rx) = oneshot::channel();

    let monitor = tokio::spawn(monitor(
        child,
        Output {
            stdout: Some(BufReader::new(stdout).lines()),
            stderr: Some(BufReader::new(stderr).lines()),
            sink: LogSink::new(log, config.log_file.clone()),
        },
        kill_rx,
        alive_tx,
    ));

    Ok(DaemonHandle {
        pid,
        alive: alive_rx,
        kill_tx: Some(kill_tx),
        monitor: Some(monitor),
    })
}

/// Poll for the control socket while the service stays alive.
///
/// Without a `timeout` the wait is unbounded, like the service's own startup.
///
/// # Errors
///
/// Returns `Error::Startup` if the service exits first, or
/// `Error::StartupTimeout` once `timeout` has elapsed.
pub async fn wait_for_socket(
    handle: &DaemonHandle,
    path: &Path,
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<()> {
    let started = Instant::now();
    loop {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!("Control socket {} is up", path.display());
            return Ok(());
        }
        if !handle.is_alive() {
            return Err(Error::Startup);
        }
        if let Some(limit) = timeout
            && started.elapsed() >= limit
        {
            return Err(Error::StartupTimeout {
                path: path.to_path_buf(),
                waited: limit,
            });
        }
        tokio::time::sleep(interval).await;
    }
}

/// Ownership of the launched service process.
///
/// Dropping the handle kills the process.
pub struct DaemonHandle {
    pid: Option<u32>,
    alive: watch::Receiver<bool>,
    kill_tx: Option<oneshot::Sender<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl DaemonHandle {
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// False once the process has exited or its monitor is gone.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.has_changed().is_ok() && *self.alive.borrow()
    }

    /// A liveness receiver that can be moved to another task
    #[must_use]
    pub fn liveness(&self) -> watch::Receiver<bool> {
        self.alive.clone()
    }

    /// Resolve once the process has exited. Cancel safe.
    pub async fn wait_exit(&mut self) {
        // Err means the monitor is gone; treated the same as an exit
        let _ = self.alive.wait_for(|alive| !alive).await;
    }

    /// Force-stop the process and wait for its output to be drained.
    pub async fn terminate(mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            // Already exited if the monitor dropped its receiver
            let _ = kill_tx.send(());
        }
        if let Some(monitor) = self.monitor.take()
            && let Err(e) = monitor.await
        {
            warn!("Service monitor task failed: {}", e);
        }
    }
}

struct Output {
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    stderr: Option<Lines<BufReader<ChildStderr>>>,
    sink: LogSink,
}

async fn monitor(
    mut child: Child,
    mut output: Output,
    mut kill_rx: oneshot::Receiver<()>,
    alive_tx: watch::Sender<bool>,
) {
    let status = loop {
        tokio::select! {
            line = next_line(&mut output.stdout) => output.sink.write_line(&line).await,
            line = next_line(&mut output.stderr) => output.sink.write_line(&line).await,
            status = child.wait() => break status,
            // A dropped handle counts as a kill request
            _ = &mut kill_rx => {
                info!("Stopping service");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill service: {}", e);
                }
                break child.wait().await;
            }
        }
    };

    // Published before draining: a helper process can hold the pipes open
    alive_tx.send_replace(false);
    log_exit(status);
    drain(&mut output.stdout, &mut output.sink).await;
    drain(&mut output.stderr, &mut output.sink).await;
}

/// Next line from a pipe; pends forever once the pipe is closed so `select!`
/// keeps serving the remaining branches.
async fn next_line<R>(lines: &mut Option<Lines<R>>) -> String
where
    R: AsyncBufRead + Unpin,
{
    if let Some(reader) = lines.as_mut() {
        match reader.next_line().await {
            Ok(Some(line)) => return line,
            Ok(None) => {}
            Err(e) => debug!("Service output closed: {}", e),
        }
    }
    *lines = None;
    std::future::pending().await
}

async fn drain<R>(lines: &mut Option<Lines<R>>, sink: &mut LogSink)
where
    R: AsyncBufRead + Unpin,
{
    let Some(reader) = lines.as_mut() else {
        return;
    };
    while let Ok(Ok(Some(line))) = tokio::time::timeout(DRAIN_TIMEOUT, reader.next_line()).await {
        sink.write_line(&line).await;
    }
    *lines = None;
}

fn log_exit(status: io::Result<ExitStatus>) {
    match status {
        Ok(status) if status.success() => info!("Service exited"),
        Ok(status) => warn!("Service exited with {}", status),
        Err(e) => warn!("Failed to reap service: {}", e),
    }
}

/// Append-only daemon log, flushed after every line
struct LogSink {
    file: File,
    path: PathBuf,
    failed: bool,
}

impl LogSink {
    fn new(file: File, path: PathBuf) -> Self {
        Self {
            file,
            path,
            failed: false,
        }
    }

    async fn write_line(&mut self, line: &str) {
        let result = async {
            self.file.write_all(line.as_bytes()).await?;
            self.file.write_all(b"\n").await?;
            self.file.flush().await
        }
        .await;

        // Report the first failure only; a full disk would otherwise flood the log
        if let Err(e) = result
            && !self.failed
        {
            self.failed = true;
            warn!("Failed to write {}: {}", self.path.display(), e);
        }
    }
}
