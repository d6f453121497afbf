//! Supervision of an ephemeral `mongod` child process.
//!
//! [`MongoServer`] owns the child, its watchdog, the task draining its output,
//! and its data directory. Dropping the handle or calling
//! [`MongoServer::stop`] releases all of them.

mod cleanup;
mod launcher;
mod log_parser;
mod options;
mod replica_set;
mod watchdog;

pub use launcher::MongoLauncher;
pub use log_parser::{StartupEvent, StartupLogParser, StartupState};
pub use options::{CleanupMode, DEFAULT_STARTUP_TIMEOUT, StartOptions};
pub use replica_set::{DriverInitiator, ReplicaSetInitiator, initiate_command};
pub use watchdog::{ShellWatchdog, WatchdogLauncher};

use camino::{Utf8Path, Utf8PathBuf};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::Result;
use crate::observability::LOG_TARGET;

/// Handle to a running `mongod`.
///
/// The port is the one the server reported in its readiness line, which
/// differs from the requested port when `0` was requested.
#[derive(Debug)]
pub struct MongoServer {
    process: Option<Child>,
    watchdog: Option<Child>,
    output_task: Option<JoinHandle<()>>,
    data_dir: Utf8PathBuf,
    data_dir_removed: bool,
    port: u16,
    replica_set: Option<String>,
    cleanup_mode: CleanupMode,
}

impl MongoServer {
    /// Provisions `version` for this host and starts it with `options`.
    ///
    /// Uses the native host, HTTPS fetcher, OpenPGP verifier, shell watchdog,
    /// and driver-based replica-set initiation. Use [`MongoLauncher`] to
    /// substitute any of them.
    ///
    /// # Errors
    ///
    /// Returns a resolution, provisioning, or supervision error. Anything
    /// started before the failure has already been torn down.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mongo_in_memory::{MongoServer, StartOptions};
    ///
    /// # async fn demo() -> mongo_in_memory::Result<()> {
    /// let mut server = MongoServer::start("5.0.2", StartOptions::default()).await?;
    /// println!("listening on {}", server.uri());
    /// server.stop();
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start(version: &str, options: StartOptions) -> Result<Self> {
        MongoLauncher::default().start(version, options).await
    }

    pub(crate) const fn new(
        data_dir: Utf8PathBuf,
        port: u16,
        replica_set: Option<String>,
        cleanup_mode: CleanupMode,
    ) -> Self {
        Self {
            process: None,
            watchdog: None,
            output_task: None,
            data_dir,
            data_dir_removed: false,
            port,
            replica_set,
            cleanup_mode,
        }
    }

    /// Returns the port the server listens on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the replica-set name, if one was initiated.
    #[must_use]
    pub fn replica_set(&self) -> Option<&str> {
        self.replica_set.as_deref()
    }

    /// Returns the data directory passed as `--dbpath`.
    #[must_use]
    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    /// Returns `mongodb://localhost:<port>`.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("mongodb://localhost:{}", self.port)
    }

    /// Returns the server's process id while it is running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(Child::id)
    }

    /// Returns the watchdog's process id while it is running.
    #[must_use]
    pub fn watchdog_pid(&self) -> Option<u32> {
        self.watchdog.as_ref().and_then(Child::id)
    }

    /// Kills the server and its watchdog and removes the data directory.
    ///
    /// Safe to call repeatedly and on a handle whose start failed part way.
    /// Individual failures are logged at `warn` and do not stop later steps.
    /// When called inside a Tokio runtime the killed processes are reaped by
    /// a background task, so their pids may linger briefly as zombies.
    pub fn stop(&mut self) {
        if let Some(process) = self.process.take() {
            info!(target: LOG_TARGET, pid = process.id(), port = self.port, "stopping mongod");
            cleanup::kill_child(process, "mongod");
        }
        if let Some(watchdog) = self.watchdog.take() {
            cleanup::kill_child(watchdog, "watchdog");
        }
        if let Some(task) = self.output_task.take() {
            task.abort();
        }
        if self.cleanup_mode == CleanupMode::RemoveData && !self.data_dir_removed {
            cleanup::remove_data_dir(&self.data_dir);
            self.data_dir_removed = true;
        }
    }

    pub(crate) const fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub(crate) fn attach_process(&mut self, process: Child) {
        self.process = Some(process);
    }

    pub(crate) fn attach_watchdog(&mut self, watchdog: Child) {
        self.watchdog = Some(watchdog);
    }

    pub(crate) fn attach_output_task(&mut self, task: JoinHandle<()>) {
        self.output_task = Some(task);
    }
}

impl Drop for MongoServer {
    fn drop(&mut self) {
        self.stop();
    }
}
