#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use knit_util::signals::{on_exit, wait_for_shutdown};
use tokio::signal::unix::{SignalKind, signal};

#[tokio::test]
async fn hangup_resolves_shutdown_and_runs_hooks() {
    // Keeps an early SIGHUP from terminating the test binary.
    let _installed = signal(SignalKind::hangup()).unwrap();

    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    on_exit("record signal", move |signal| {
        *slot.lock().unwrap() = Some(signal.name.clone());
    })
    .keep();

    let waiter = tokio::spawn(wait_for_shutdown());
    tokio::time::sleep(Duration::from_millis(200)).await;
    unsafe {
        libc::kill(libc::getpid(), libc::SIGHUP);
    }

    let received = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("shutdown resolved in time")
        .expect("waiter task completed")
        .expect("signal streams installed");

    assert_eq!(received.name, "SIGHUP");
    assert_eq!(received.number, 1);
    assert_eq!(seen.lock().unwrap().as_deref(), Some("SIGHUP"));
}
