//! Host capabilities consulted while resolving a download.
//!
//! The resolver and the cache path builder never read ambient process state
//! directly. They receive a [`HostSystem`] and an [`OsReleaseReader`], so tests
//! can describe any host without mutating the environment.

use std::fmt;

/// Operating system, CPU architecture, and environment lookups for the host.
pub trait HostSystem: Send + Sync + fmt::Debug {
    /// Returns the operating system name, e.g. `linux` or `macos`.
    fn os(&self) -> &str;

    /// Returns the CPU architecture name, e.g. `x86_64`.
    fn arch(&self) -> &str;

    /// Looks up an environment variable, treating absent and non-UTF-8 values alike.
    fn var(&self, key: &str) -> Option<String>;
}

/// [`HostSystem`] backed by the compile-time target and the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeHost;

impl HostSystem for NativeHost {
    fn os(&self) -> &str {
        std::env::consts::OS
    }

    fn arch(&self) -> &str {
        std::env::consts::ARCH
    }

    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// The two `os-release` fields needed to pick a Linux build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsRelease {
    /// Distribution identifier, e.g. `ubuntu` or `debian`.
    pub id: String,
    /// Distribution version, e.g. `20.04` or `10`.
    pub version_id: String,
}

impl OsRelease {
    /// Builds a release description from its two fields.
    #[must_use]
    pub fn new(id: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version_id: version_id.into(),
        }
    }
}

/// Reads the Linux distribution identity of the host.
pub trait OsReleaseReader: Send + Sync + fmt::Debug {
    /// Returns the distribution id and version.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the release information is unavailable.
    fn read(&self) -> Result<OsRelease, String>;
}

/// [`OsReleaseReader`] backed by `sysinfo`, which parses `/etc/os-release`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoOsRelease;

impl OsReleaseReader for SysinfoOsRelease {
    fn read(&self) -> Result<OsRelease, String> {
        let id = sysinfo::System::distribution_id();
        let version_id = sysinfo::System::os_version()
            .ok_or_else(|| format!("no VERSION_ID reported for distribution '{id}'"))?;
        Ok(OsRelease { id, version_id })
    }
}
