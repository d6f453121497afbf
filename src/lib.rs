//! Provisions a verified, cached `mongod` binary and supervises it as an
//! ephemeral child process for test suites.
//!
//! The library resolves the build matching the host, downloads and verifies
//! it once into a shared on-disk cache, then launches it against a throwaway
//! data directory. Startup waits for the server to report the port it
//! actually bound, and a companion watchdog kills the server if the owning
//! process dies without cleaning up.

pub mod cache;
mod download;
mod error;
mod fs;
mod observability;
mod platform;
mod server;
#[doc(hidden)]
pub mod test_support;
mod version;

pub use cache::BinaryCache;
pub use download::{
    DEFAULT_DOWNLOAD_BASE, DEFAULT_KEY_BASE, DownloadSources, Fetcher, HttpFetcher,
    OpenPgpVerifier, ProvisionConfig, SignatureVerifier, build_download_url,
};
pub use error::{
    ConfigError, ConfigResult, MongoError, ProvisionError, ProvisionErrorKind, ProvisionResult,
    ResolveError, ResolveResult, Result, ServerError, ServerErrorKind, ServerResult,
};
pub use platform::{HostSystem, NativeHost, OsRelease, OsReleaseReader, SysinfoOsRelease};
pub use server::{
    CleanupMode, DEFAULT_STARTUP_TIMEOUT, DriverInitiator, MongoLauncher, MongoServer,
    ReplicaSetInitiator, ShellWatchdog, StartOptions, StartupEvent, StartupLogParser,
    StartupState, WatchdogLauncher, initiate_command,
};
pub use version::{Arch, DistroTag, Platform, VersionSpec};

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use color_eyre::eyre::eyre;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::observability::LOG_TARGET;

/// Version provisioned when none is configured.
pub const DEFAULT_VERSION: &str = "5.0.2";

/// Captures server settings supplied via `MONGO_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, OrthoConfig, Default)]
#[ortho_config(prefix = "MONGO")]
///
/// # Examples
/// ```
/// use mongo_in_memory::MongoEnvCfg;
///
/// let cfg = MongoEnvCfg::default();
/// assert!(cfg.port.is_none());
/// assert_eq!(cfg.version().unwrap_or_default(), "5.0.2");
/// ```
pub struct MongoEnvCfg {
    /// Server version in `x.y.z` form.
    #[ortho_config(cli_long = "mongo-version")]
    pub version: Option<String>,
    /// Port requested for the server; `0` lets the operating system choose.
    pub port: Option<u16>,
    /// Name of a single-member replica set to initiate.
    pub repl_set: Option<String>,
    /// Directory passed to `mongod` as `--dbpath` when provided.
    pub data_dir: Option<Utf8PathBuf>,
    /// Root of the binary cache when provided.
    pub binary_cache_dir: Option<Utf8PathBuf>,
    /// Base URL of an archive mirror when provided.
    pub download_url: Option<String>,
    /// Seconds to wait for the server to report readiness.
    pub startup_timeout_secs: Option<u64>,
}

fn non_empty<'a>(value: Option<&'a str>, variable: &str) -> ConfigResult<Option<&'a str>> {
    match value {
        Some(raw) if raw.trim().is_empty() => Err(ConfigError::from(eyre!(
            "{variable} must not be empty"
        ))),
        other => Ok(other),
    }
}

impl MongoEnvCfg {
    /// Loads configuration from environment variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a variable cannot be parsed.
    pub fn load() -> ConfigResult<Self> {
        let args = [OsString::from("mongo-in-memory")];
        Self::load_from_iter(args).map_err(|err| ConfigError::from(eyre!(err)))
    }

    /// Returns the configured version or [`DEFAULT_VERSION`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `MONGO_VERSION` is blank.
    pub fn version(&self) -> ConfigResult<String> {
        Ok(non_empty(self.version.as_deref(), "MONGO_VERSION")?
            .unwrap_or(DEFAULT_VERSION)
            .trim()
            .to_owned())
    }

    /// Converts the configuration into [`StartOptions`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a string setting is blank or the startup
    /// timeout is zero.
    pub fn to_start_options(&self) -> ConfigResult<StartOptions> {
        let mut options = StartOptions::default();
        if let Some(port) = self.port {
            options = options.with_port(port);
        }
        if let Some(name) = non_empty(self.repl_set.as_deref(), "MONGO_REPL_SET")? {
            options = options.with_replica_set(name);
        }
        if let Some(dir) = &self.data_dir {
            options = options.with_data_dir(dir.clone());
        }
        if let Some(dir) = &self.binary_cache_dir {
            options = options.with_cache_root(dir.clone());
        }
        if let Some(url) = non_empty(self.download_url.as_deref(), "MONGO_DOWNLOAD_URL")? {
            options = options.with_sources(DownloadSources::new(url, DEFAULT_KEY_BASE));
        }
        match self.startup_timeout_secs {
            Some(0) => {
                return Err(ConfigError::from(eyre!(
                    "MONGO_STARTUP_TIMEOUT_SECS must be greater than zero"
                )));
            }
            Some(secs) => options = options.with_startup_timeout(Duration::from_secs(secs)),
            None => {}
        }
        Ok(options)
    }
}

/// Ensures the configured `mongod` build is present in the cache and returns
/// its path.
///
/// Configuration is read from `MONGO_*` environment variables. Nothing is
/// started.
///
/// # Errors
///
/// Returns a configuration, resolution, or provisioning error.
pub fn run() -> Result<Utf8PathBuf> {
    let cfg = MongoEnvCfg::load()?;
    let version = cfg.version()?;
    let options = cfg.to_start_options()?;
    let path = MongoLauncher::default().ensure_binary(&version, &options)?;
    tracing::info!(target: LOG_TARGET, version = %version, path = %path, "mongod binary ready");
    Ok(path)
}
