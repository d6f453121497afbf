//! Provisioning plus startup, with every external capability injectable.

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{Instrument, info, info_span};

use super::log_parser::{StartupEvent, monitor_output};
use super::{MongoServer, ReplicaSetInitiator, StartOptions, WatchdogLauncher};
use super::{DriverInitiator, ShellWatchdog};
use crate::cache::{BinaryCache, resolve_cache_root};
use crate::download::{Fetcher, HttpFetcher, OpenPgpVerifier, ProvisionConfig, SignatureVerifier};
use crate::error::{ResolveResult, Result, ServerError, ServerErrorKind, ServerResult};
use crate::fs::ensure_dir_exists;
use crate::observability::{LOG_TARGET, SERVER_LOG_TARGET};
use crate::platform::{HostSystem, NativeHost, OsReleaseReader, SysinfoOsRelease};
use crate::version::VersionSpec;

/// Resolves, provisions, and starts `mongod` using injectable capabilities.
///
/// The default launcher talks to the real host, network, and driver. Tests
/// swap individual capabilities with the `with_*` builders.
#[derive(Clone)]
pub struct MongoLauncher {
    host: Arc<dyn HostSystem>,
    os_release: Arc<dyn OsReleaseReader>,
    fetcher: Arc<dyn Fetcher>,
    signatures: Arc<dyn SignatureVerifier>,
    watchdog: Arc<dyn WatchdogLauncher>,
    initiator: Arc<dyn ReplicaSetInitiator>,
}

impl fmt::Debug for MongoLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoLauncher")
            .field("host", &self.host)
            .field("os_release", &self.os_release)
            .field("watchdog", &self.watchdog)
            .field("initiator", &self.initiator)
            .finish_non_exhaustive()
    }
}

impl Default for MongoLauncher {
    fn default() -> Self {
        Self {
            host: Arc::new(NativeHost),
            os_release: Arc::new(SysinfoOsRelease),
            fetcher: Arc::new(HttpFetcher::default()),
            signatures: Arc::new(OpenPgpVerifier),
            watchdog: Arc::new(ShellWatchdog),
            initiator: Arc::new(DriverInitiator),
        }
    }
}

fn server_error(kind: ServerErrorKind, report: color_eyre::Report) -> ServerError {
    ServerError::new(kind, report)
}

impl MongoLauncher {
    /// Replaces the host description.
    #[must_use]
    pub fn with_host(mut self, host: Arc<dyn HostSystem>) -> Self {
        self.host = host;
        self
    }

    /// Replaces the `os-release` reader.
    #[must_use]
    pub fn with_os_release(mut self, os_release: Arc<dyn OsReleaseReader>) -> Self {
        self.os_release = os_release;
        self
    }

    /// Replaces the fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replaces the signature verifier.
    #[must_use]
    pub fn with_signature_verifier(mut self, signatures: Arc<dyn SignatureVerifier>) -> Self {
        self.signatures = signatures;
        self
    }

    /// Replaces the watchdog launcher.
    #[must_use]
    pub fn with_watchdog(mut self, watchdog: Arc<dyn WatchdogLauncher>) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Replaces the replica-set initiator.
    #[must_use]
    pub fn with_replica_set_initiator(mut self, initiator: Arc<dyn ReplicaSetInitiator>) -> Self {
        self.initiator = initiator;
        self
    }

    /// Resolves `version` for this launcher's host and derives its download
    /// and cache locations.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ResolveError`] when the version, host, or cache root
    /// cannot be resolved.
    pub fn provision_config(
        &self,
        version: &str,
        options: &StartOptions,
    ) -> ResolveResult<ProvisionConfig> {
        let spec = VersionSpec::resolve(version, self.host.as_ref(), self.os_release.as_ref())?;
        let root = match options.cache_root() {
            Some(root) => root.to_path_buf(),
            None => resolve_cache_root(self.host.as_ref())?,
        };
        ProvisionConfig::new(spec, options.sources(), &root)
    }

    /// Returns the path of a verified `mongod` for `version`, downloading it
    /// on a cache miss.
    ///
    /// This blocks on network and disk I/O; async callers should use
    /// [`MongoLauncher::start`] or move the call onto a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns a resolution or provisioning error.
    pub fn ensure_binary(&self, version: &str, options: &StartOptions) -> Result<Utf8PathBuf> {
        let config = self.provision_config(version, options)?;
        let cache = BinaryCache::new(Arc::clone(&self.fetcher), Arc::clone(&self.signatures));
        Ok(cache.ensure_available(&config)?)
    }

    /// Provisions `version` and starts it, returning once the server reports
    /// the port it listens on.
    ///
    /// # Errors
    ///
    /// Returns a resolution, provisioning, or supervision error. On a
    /// supervision error everything started so far is stopped first.
    pub async fn start(&self, version: &str, options: StartOptions) -> Result<MongoServer> {
        let span = info_span!(target: LOG_TARGET, "mongod_start", version);
        async move {
            let binary = self.provision_blocking(version, &options).await?;
            let data_dir = prepare_data_dir(&options)?;
            let mut server = MongoServer::new(
                data_dir,
                options.port(),
                options.replica_set().map(str::to_owned),
                options.cleanup_mode(),
            );
            match self.launch(&binary, &options, &mut server).await {
                Ok(()) => Ok(server),
                Err(err) => {
                    server.stop();
                    Err(err.into())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn provision_blocking(&self, version: &str, options: &StartOptions) -> Result<Utf8PathBuf> {
        let launcher = self.clone();
        let requested = version.to_owned();
        let provision_options = options.clone();
        tokio::task::spawn_blocking(move || launcher.ensure_binary(&requested, &provision_options))
            .await
            .map_err(|err| {
                server_error(
                    ServerErrorKind::Provision,
                    eyre!(err).wrap_err("provisioning task failed"),
                )
            })?
    }

    async fn launch(
        &self,
        binary: &Utf8Path,
        options: &StartOptions,
        server: &mut MongoServer,
    ) -> ServerResult<()> {
        let args = options.mongod_args(server.data_dir());
        info!(
            target: SERVER_LOG_TARGET,
            binary = %binary,
            data_dir = %server.data_dir(),
            port = options.port(),
            "launching mongod"
        );
        let mut child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                server_error(
                    ServerErrorKind::Launch,
                    eyre!(err).wrap_err(format!("failed to spawn {binary}")),
                )
            })?;
        let handles = (child.stdout.take(), child.stderr.take(), child.id());
        server.attach_process(child);

        let (Some(stdout), Some(stderr), Some(child_pid)) = handles else {
            return Err(server_error(
                ServerErrorKind::Launch,
                eyre!("mongod started without output pipes or a pid"),
            ));
        };
        let (events_tx, events_rx) = oneshot::channel();
        server.attach_output_task(tokio::spawn(monitor_output(stdout, stderr, events_tx)));

        let owner_pid = std::process::id();
        let watchdog = self.watchdog.launch(owner_pid, child_pid).map_err(|err| {
            server_error(
                ServerErrorKind::Watchdog,
                eyre!(err).wrap_err("failed to start watchdog"),
            )
        })?;
        info!(
            target: SERVER_LOG_TARGET,
            owner_pid,
            child_pid,
            watchdog_pid = watchdog.id(),
            "watchdog started"
        );
        server.attach_watchdog(watchdog);

        let port = await_startup(events_rx, options).await?;
        server.set_port(port);
        info!(target: SERVER_LOG_TARGET, port, pid = child_pid, "mongod is accepting connections");

        if let Some(name) = options.replica_set() {
            let uri = server.uri();
            self.initiator
                .initiate(&uri, name, port)
                .await
                .map_err(|err| {
                    server_error(
                        ServerErrorKind::ReplicaSet,
                        err.wrap_err(format!("failed to initiate replica set {name}")),
                    )
                })?;
            info!(target: SERVER_LOG_TARGET, replica_set = name, port, "replica set initiated");
        }
        Ok(())
    }
}

fn prepare_data_dir(options: &StartOptions) -> ServerResult<Utf8PathBuf> {
    if let Some(dir) = options.data_dir() {
        ensure_dir_exists(dir).map_err(|err| server_error(ServerErrorKind::DataDirectory, err))?;
        return Ok(dir.to_path_buf());
    }
    let created = tempfile::Builder::new()
        .prefix("mongo-in-memory-")
        .tempdir()
        .map_err(|err| {
            server_error(
                ServerErrorKind::DataDirectory,
                eyre!(err).wrap_err("failed to create temporary data directory"),
            )
        })?
        .keep();
    Utf8PathBuf::from_path_buf(created).map_err(|path| {
        // Best effort: the directory was created but cannot be addressed as UTF-8.
        if let Err(err) = std::fs::remove_dir(&path) {
            tracing::warn!(target: LOG_TARGET, path = %path.display(), error = %err, "failed to remove data directory");
        }
        server_error(
            ServerErrorKind::DataDirectory,
            eyre!("temporary data directory {} is not valid UTF-8", path.display()),
        )
    })
}

async fn await_startup(
    events: oneshot::Receiver<StartupEvent>,
    options: &StartOptions,
) -> ServerResult<u16> {
    let timeout = options.startup_timeout();
    match tokio::time::timeout(timeout, events).await {
        Ok(Ok(StartupEvent::Listening(port))) => Ok(port),
        Ok(Ok(StartupEvent::Failed(message))) => Err(server_error(
            ServerErrorKind::StartupFailed,
            eyre!("mongod failed to start: {message}"),
        )),
        Ok(Err(_closed)) => Err(server_error(
            ServerErrorKind::StartupFailed,
            eyre!("mongod exited before accepting connections"),
        )),
        Err(_elapsed) => Err(server_error(
            ServerErrorKind::StartupTimeout,
            eyre!("mongod did not report readiness within {timeout:?}"),
        )),
    }
}
