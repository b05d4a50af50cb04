//! Tests for broker startup against a launched service
//!
//! Kept in their own test binary: the full startup test copies an executable
//! and runs it, which must not race with forks from other tests.

mod common;

use std::time::Duration;

use common::{FakeService, KEY, WAIT, view};
use gatebar_broker::{Broker, StopReason, run};
use gatebar_core::{Config, Directories};
use gatebar_rpc::QueryConnection;
use tokio::net::UnixListener;

#[tokio::test]
async fn test_run_exits_when_service_already_running() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::with_dirs(&Directories::with_base(dir.path().to_path_buf()));
    config.daemon.binary = std::env::current_exe().unwrap();
    config.daemon.socket_path = dir.path().join("appgate.service.sock");
    std::fs::write(&config.daemon.socket_path, b"").unwrap();

    tokio::time::timeout(WAIT, run(&config))
        .await
        .unwrap()
        .unwrap();

    assert!(config.daemon.socket_path.exists());
    assert!(!config.daemon.log_file.exists());
}

#[tokio::test]
async fn test_start_launches_service_and_serves() {
    let dir = tempfile::tempdir().unwrap();
    let binary = dir.path().join("appgateservice");
    std::fs::copy("/bin/sleep", &binary).unwrap();

    let mut config = Config::with_dirs(&Directories::with_base(dir.path().to_path_buf()));
    config.daemon.binary.clone_from(&binary);
    config.daemon.args = vec!["30".to_string()];
    config.daemon.startup_poll_interval_ms = 10;
    config.daemon.startup_timeout_ms = Some(5000);
    config.query.port = 0;
    std::fs::create_dir_all(config.daemon.socket_path.parent().unwrap()).unwrap();

    // A stale socket from a "crashed" run must be cleared before launch
    std::fs::write(&config.daemon.socket_path, b"").unwrap();

    // Stand in for the service's control socket once it has been launched
    let socket = config.daemon.socket_path.clone();
    let log_file = config.daemon.log_file.clone();
    let service = tokio::spawn(async move {
        while !log_file.exists() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        FakeService::serve(UnixListener::bind(&socket).unwrap(), &view("login"))
    });

    let broker = tokio::time::timeout(WAIT, Broker::start(&config))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let service = service.await.unwrap();
    let addr = broker.local_addr().unwrap();
    let task = tokio::spawn(broker.serve());

    let mut conn = QueryConnection::connect(addr, KEY).await.unwrap();
    conn.send_text("status").await.unwrap();
    assert_eq!(conn.recv_text().await.unwrap().as_deref(), Some("login"));
    conn.send_text("exit-service").await.unwrap();

    let reason = tokio::time::timeout(WAIT, task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reason, StopReason::ExitRequested);
    assert_eq!(service.polls(), 1);
    assert!(!gatebar_core::process_running(&binary));
}
