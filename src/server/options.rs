//! Caller-facing knobs for launching a server.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::download::DownloadSources;

/// Time allowed for `mongod` to report readiness.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Controls what happens to the data directory when the server stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CleanupMode {
    /// Remove the data directory on stop.
    #[default]
    RemoveData,
    /// Leave the data directory in place.
    None,
}

/// Options for [`crate::MongoServer::start`] and [`crate::MongoLauncher::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    port: u16,
    replica_set: Option<String>,
    data_dir: Option<Utf8PathBuf>,
    startup_timeout: Duration,
    cleanup_mode: CleanupMode,
    cache_root: Option<Utf8PathBuf>,
    sources: DownloadSources,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            port: 0,
            replica_set: None,
            data_dir: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            cleanup_mode: CleanupMode::default(),
            cache_root: None,
            sources: DownloadSources::default(),
        }
    }
}

impl StartOptions {
    /// Requests a specific port; `0` lets the operating system choose.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Starts a single-member replica set with the given name.
    #[must_use]
    pub fn with_replica_set(mut self, name: impl Into<String>) -> Self {
        self.replica_set = Some(name.into());
        self
    }

    /// Uses `dir` instead of a fresh temporary directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Overrides the readiness deadline.
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Chooses whether `stop` removes the data directory.
    #[must_use]
    pub const fn with_cleanup_mode(mut self, mode: CleanupMode) -> Self {
        self.cleanup_mode = mode;
        self
    }

    /// Uses `root` instead of the environment-derived cache root.
    #[must_use]
    pub fn with_cache_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    /// Fetches archives and keys from `sources`.
    #[must_use]
    pub fn with_sources(mut self, sources: DownloadSources) -> Self {
        self.sources = sources;
        self
    }

    /// Returns the requested port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the replica-set name, if any.
    #[must_use]
    pub fn replica_set(&self) -> Option<&str> {
        self.replica_set.as_deref()
    }

    /// Returns the caller-supplied data directory, if any.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Utf8Path> {
        self.data_dir.as_deref()
    }

    /// Returns the readiness deadline.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    /// Returns the cleanup policy.
    #[must_use]
    pub const fn cleanup_mode(&self) -> CleanupMode {
        self.cleanup_mode
    }

    /// Returns the cache root override, if any.
    #[must_use]
    pub fn cache_root(&self) -> Option<&Utf8Path> {
        self.cache_root.as_deref()
    }

    /// Returns the download sources.
    #[must_use]
    pub const fn sources(&self) -> &DownloadSources {
        &self.sources
    }

    /// Builds the `mongod` argument list for `data_dir`.
    ///
    /// Without a replica set the in-memory `ephemeralForTest` engine is used;
    /// replica sets need an oplog, so they run on `wiredTiger`.
    #[must_use]
    pub fn mongod_args(&self, data_dir: &Utf8Path) -> Vec<String> {
        let mut args = vec![
            "--bind_ip".to_owned(),
            "localhost".to_owned(),
            "--port".to_owned(),
            self.port.to_string(),
            "--dbpath".to_owned(),
            data_dir.to_string(),
            "--storageEngine".to_owned(),
        ];
        match &self.replica_set {
            Some(name) => args.extend([
                "wiredTiger".to_owned(),
                "--replSet".to_owned(),
                name.clone(),
            ]),
            None => args.push("ephemeralForTest".to_owned()),
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, &["--storageEngine", "ephemeralForTest"])]
    #[case(Some("rs0"), &["--storageEngine", "wiredTiger", "--replSet", "rs0"])]
    fn mongod_args_select_engine_by_replica_set(
        #[case] replica_set: Option<&str>,
        #[case] tail: &[&str],
    ) {
        let base = StartOptions::default().with_port(27017);
        let options = match replica_set {
            Some(name) => base.with_replica_set(name),
            None => base,
        };
        let args = options.mongod_args(Utf8Path::new("/tmp/data"));
        let mut expected = vec!["--bind_ip", "localhost", "--port", "27017", "--dbpath", "/tmp/data"];
        expected.extend_from_slice(tail);
        assert_eq!(args, expected);
    }

    #[test]
    fn defaults_match_documented_behaviour() {
        let options = StartOptions::default();
        assert_eq!(options.port(), 0);
        assert_eq!(options.startup_timeout(), Duration::from_secs(5));
        assert_eq!(options.cleanup_mode(), CleanupMode::RemoveData);
        assert!(options.replica_set().is_none());
        assert!(options.data_dir().is_none());
    }
}
