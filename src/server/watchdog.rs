//! Companion process that kills `mongod` once its owner disappears.
//!
//! `kill_on_drop` only covers orderly drops of the supervisor. When the owning
//! process is killed outright nothing runs, so a detached watchdog polls the
//! owner and issues `SIGKILL` to the server itself.

use std::fmt;
use std::io;
use std::process::Stdio;

use tokio::process::{Child, Command};

/// Starts a watchdog for `child_pid` tied to the lifetime of `owner_pid`.
pub trait WatchdogLauncher: Send + Sync + fmt::Debug {
    /// Spawns the watchdog and returns a handle the supervisor can kill.
    ///
    /// # Errors
    ///
    /// Returns the spawn error when the watchdog cannot be started.
    fn launch(&self, owner_pid: u32, child_pid: u32) -> io::Result<Child>;
}

/// [`WatchdogLauncher`] implemented as a `/bin/sh` polling loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellWatchdog;

impl ShellWatchdog {
    /// Returns the shell program run by the watchdog.
    #[must_use]
    pub fn script(owner_pid: u32, child_pid: u32) -> String {
        format!(
            "while kill -0 {owner_pid} 2>/dev/null; do sleep 1; done; kill -9 {child_pid} 2>/dev/null"
        )
    }
}

impl WatchdogLauncher for ShellWatchdog {
    fn launch(&self, owner_pid: u32, child_pid: u32) -> io::Result<Child> {
        Command::new("/bin/sh")
            .arg("-c")
            .arg(Self::script(owner_pid, child_pid))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}
