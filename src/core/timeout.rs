//! Deadline enforcement for collaborator calls.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Outcome of a call run under a deadline.
#[derive(Debug, PartialEq)]
pub enum Deadline<T> {
    /// The call returned in time.
    Completed(T),
    /// The deadline passed first. The call keeps running detached and its
    /// result is discarded.
    TimedOut,
    /// The call panicked.
    Panicked,
}

/// Runs `f`, waiting at most `timeout` for it to return.
///
/// With `timeout = None` the call runs on the current thread. Otherwise it runs
/// on a helper thread whose result is awaited over a channel.
pub fn run_with_timeout<T, F>(timeout: Option<Duration>, f: F) -> Deadline<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let Some(timeout) = timeout else {
        return match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
            Ok(value) => Deadline::Completed(value),
            Err(_) => Deadline::Panicked,
        };
    };

    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("layout-call".to_string())
        .spawn(move || {
            let _ = tx.send(f());
        });
    if spawned.is_err() {
        return Deadline::Panicked;
    }

    match rx.recv_timeout(timeout) {
        Ok(value) => Deadline::Completed(value),
        Err(mpsc::RecvTimeoutError::Timeout) => Deadline::TimedOut,
        Err(mpsc::RecvTimeoutError::Disconnected) => Deadline::Panicked,
    }
}
