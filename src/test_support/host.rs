//! Host and `os-release` fakes.

use std::collections::BTreeMap;

use crate::platform::{HostSystem, OsRelease, OsReleaseReader};

/// [`HostSystem`] with a fixed OS, architecture, and environment.
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    os: String,
    arch: String,
    vars: BTreeMap<String, String>,
}

impl FakeHost {
    /// Describes a host with the given OS and architecture and no environment.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            vars: BTreeMap::new(),
        }
    }

    /// An `x86_64` Linux host.
    #[must_use]
    pub fn linux() -> Self {
        Self::new("linux", "x86_64")
    }

    /// An `x86_64` macOS host.
    #[must_use]
    pub fn macos() -> Self {
        Self::new("macos", "x86_64")
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl HostSystem for FakeHost {
    fn os(&self) -> &str {
        &self.os
    }

    fn arch(&self) -> &str {
        &self.arch
    }

    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// [`OsReleaseReader`] returning a fixed answer.
#[derive(Debug, Clone)]
pub struct StaticOsRelease(Option<OsRelease>);

impl StaticOsRelease {
    /// Reports the given distribution id and version.
    #[must_use]
    pub fn new(id: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self(Some(OsRelease::new(id, version_id)))
    }

    /// Fails every read, as on a host without `/etc/os-release`.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self(None)
    }
}

impl OsReleaseReader for StaticOsRelease {
    fn read(&self) -> Result<OsRelease, String> {
        self.0
            .clone()
            .ok_or_else(|| "os-release is unavailable".to_owned())
    }
}
