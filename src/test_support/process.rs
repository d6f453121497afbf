//! Stand-ins for the `mongod` executable and process probes.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use camino::Utf8Path;
use color_eyre::eyre::{Context, Result};

/// Scripted behaviours for a fake `mongod`.
///
/// Each variant writes a `/bin/sh` script that prints structured log lines
/// like the real server. Variants that keep running end in `exec sleep`, so
/// the script's own pid is the one the supervisor must terminate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeMongod {
    /// Prints some noise, then reports it is listening on `port`, then idles.
    Ready {
        /// Port announced in the readiness line.
        port: u16,
    },
    /// Reports an error-severity line carrying `message`, then idles.
    Fails {
        /// Message of the error line.
        message: String,
    },
    /// Never prints a qualifying line and idles.
    Silent,
    /// Exits immediately without reporting readiness.
    Exits,
}

impl FakeMongod {
    fn script(&self) -> String {
        let body = match self {
            Self::Ready { port } => format!(
                concat!(
                    "echo 'booting'\n",
                    "echo '{{\"s\":\"I\",\"c\":\"CONTROL\",\"msg\":\"Build Info\",\"attr\":{{}}}}'\n",
                    "echo '{{\"s\":\"W\",\"c\":\"STORAGE\",\"msg\":\"noise\"}}' >&2\n",
                    "echo '{{\"s\":\"I\",\"c\":\"NETWORK\",\"msg\":\"Waiting for connections\",\"attr\":{{\"port\":{port},\"ssl\":\"off\"}}}}'\n",
                    "exec sleep 30\n",
                ),
                port = port
            ),
            Self::Fails { message } => format!(
                "echo '{{\"s\":\"E\",\"c\":\"STORAGE\",\"msg\":\"{message}\"}}'\nexec sleep 30\n"
            ),
            Self::Silent => "exec sleep 30\n".to_owned(),
            Self::Exits => "echo 'shutting down'\nexit 3\n".to_owned(),
        };
        format!("#!/bin/sh\n{body}")
    }
}

/// Writes `behaviour` as an executable script at `path`, creating parents.
///
/// # Errors
///
/// Returns an error when the script cannot be written or made executable.
pub fn write_fake_mongod(path: &Utf8Path, behaviour: &FakeMongod) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {parent}"))?;
    }
    fs::write(path, behaviour.script()).with_context(|| format!("write {path}"))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod {path}"))
}

/// Reports whether a process with `pid` exists and has not been reaped.
///
/// Zombies count as running until their parent reaps them.
#[must_use]
pub fn process_is_running(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 probes whether the process exists without delivering
    // a signal.
    let rc = unsafe { libc::kill(raw, 0) };
    if rc == 0 {
        return true;
    }
    !matches!(
        std::io::Error::last_os_error().raw_os_error(),
        Some(code) if code == libc::ESRCH
    )
}
