//! Signal handling for the broker main loop
//!
//! Signals are process-wide, so this test lives in its own binary.

mod common;

use common::{TestBroker, ask, view};
use gatebar_broker::StopReason;

fn interrupt_self() {
    let status = std::process::Command::new("kill")
        .args(["-INT", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn test_interrupt_during_session_stops_broker() {
    let broker = TestBroker::start(&view("login")).await;
    let socket = broker.socket.clone();
    let liveness = broker.liveness.clone();

    // An answered query proves the loop, and its signal handlers, are running
    let mut conn = broker.connect().await;
    assert_eq!(ask(&mut conn, "status").await, "login");

    interrupt_self();

    assert_eq!(broker.finished().await, StopReason::Signal);
    assert!(!*liveness.borrow());
    assert!(!socket.exists());
    drop(conn);
}
