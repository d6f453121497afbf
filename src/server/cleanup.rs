//! Best-effort teardown steps used by `MongoServer::stop`.
//!
//! Every helper logs its own failure and returns normally so one failed step
//! never prevents the next.

use std::io::ErrorKind;
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use tokio::process::Child;
use tokio::runtime::Handle;

use crate::fs::{RemovalOutcome, remove_dir_tree};
use crate::observability::LOG_TARGET;

const REAP_ATTEMPTS: u32 = 50;
const REAP_DELAY: Duration = Duration::from_millis(10);

/// Sends `SIGKILL` to `child` and reaps it.
///
/// Inside a Tokio runtime the reap is handed to a background task so a
/// worker thread never sleeps here. Outside one, the caller waits briefly.
pub(super) fn kill_child(mut child: Child, label: &'static str) {
    let pid = child.id();
    match child.start_kill() {
        Ok(()) => {}
        // Already reaped: nothing to signal.
        Err(err) if err.kind() == ErrorKind::InvalidInput => {
            tracing::debug!(target: LOG_TARGET, label, "process already exited");
            return;
        }
        Err(err) => {
            tracing::warn!(target: LOG_TARGET, label, pid, error = %err, "failed to kill process");
            return;
        }
    }
    if reaped(&mut child, label, pid) {
        return;
    }
    match Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                match child.wait().await {
                    Ok(status) => {
                        tracing::debug!(target: LOG_TARGET, label, pid, %status, "process reaped");
                    }
                    Err(err) => {
                        tracing::warn!(target: LOG_TARGET, label, pid, error = %err, "failed to reap process");
                    }
                }
            });
        }
        Err(_) => reap_blocking(&mut child, label, pid),
    }
}

/// Returns `true` once the child has been collected or cannot be waited on.
fn reaped(child: &mut Child, label: &str, pid: Option<u32>) -> bool {
    match child.try_wait() {
        Ok(Some(status)) => {
            tracing::debug!(target: LOG_TARGET, label, pid, %status, "process reaped");
            true
        }
        Ok(None) => false,
        Err(err) => {
            tracing::warn!(target: LOG_TARGET, label, pid, error = %err, "failed to reap process");
            true
        }
    }
}

fn reap_blocking(child: &mut Child, label: &str, pid: Option<u32>) {
    for _ in 0..REAP_ATTEMPTS {
        thread::sleep(REAP_DELAY);
        if reaped(child, label, pid) {
            return;
        }
    }
    tracing::warn!(target: LOG_TARGET, label, pid, "process did not exit after SIGKILL");
}

/// Removes the data directory, logging the outcome.
pub(super) fn remove_data_dir(path: &Utf8Path) {
    match remove_dir_tree(path) {
        Ok(RemovalOutcome::Removed) => {
            tracing::info!(target: LOG_TARGET, path = %path, "removed data directory");
        }
        Ok(RemovalOutcome::Missing) => {
            tracing::debug!(target: LOG_TARGET, path = %path, "data directory already removed");
        }
        Err(err) => {
            tracing::warn!(target: LOG_TARGET, path = %path, error = %err, "failed to remove data directory");
        }
    }
}
