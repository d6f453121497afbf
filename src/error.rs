//! Domain error types for provisioning and supervising `mongod`.

use color_eyre::Report;
use thiserror::Error;

/// Result alias for operations that may return a [`MongoError`].
pub type Result<T> = std::result::Result<T, MongoError>;

/// Result alias for version and platform resolution.
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// Result alias for download, verification, extraction, and caching.
pub type ProvisionResult<T> = std::result::Result<T, ProvisionError>;

/// Result alias for process supervision.
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Result alias for configuration fallible operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level error exposed by the crate.
#[derive(Debug, Error)]
pub enum MongoError {
    /// The requested version or the host platform could not be resolved.
    #[error("version resolution failed: {0}")]
    Resolve(#[from] ResolveError),
    /// Downloading, verifying, or caching the binary failed.
    #[error("binary provisioning failed: {0}")]
    Provision(#[from] ProvisionError),
    /// Launching or supervising the server failed.
    #[error("server supervision failed: {0}")]
    Server(#[from] ServerError),
    /// Configuration parsing failed.
    #[error("configuration parsing failed: {0}")]
    Config(#[from] ConfigError),
}

/// Terminal failures raised while turning a version string and host into a
/// download descriptor. Every variant keeps the offending input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The version string is not three dot-separated non-negative integers.
    #[error("invalid MongoDB version '{version}': {reason}")]
    MalformedVersion {
        /// The version string as supplied.
        version: String,
        /// Which part failed and why.
        reason: String,
    },
    /// The version parses but predates the supported release line.
    #[error("MongoDB version {version} is not supported: only version 4.4 and above are supported")]
    UnsupportedVersion {
        /// The version string as supplied.
        version: String,
    },
    /// The host OS, architecture, or Linux distribution has no published build.
    #[error("unsupported system: {0}")]
    UnsupportedSystem(String),
    /// The platform name has no archive layout.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
    /// The download URL could not be turned into a cache path.
    #[error("invalid download URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL as built.
        url: String,
        /// Parser diagnostic.
        reason: String,
    },
}

/// Categorises provisioning failures so callers can branch on structured errors.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum ProvisionErrorKind {
    /// Represents errors without a more specific semantic meaning.
    #[default]
    Other,
    /// The HTTP request could not be sent or its body could not be read.
    Transport,
    /// The server answered with a status other than `200 OK`.
    HttpStatus(u16),
    /// The archive digest does not match the published checksum.
    ChecksumFailed,
    /// The detached signature does not verify against the release key.
    SignatureFailed,
    /// The archive contains no `bin/mongod` entry.
    BinaryNotFound,
    /// A local filesystem operation failed.
    Filesystem,
}

/// Captures provisioning failures.
#[derive(Debug, Error)]
#[error("{report}")]
pub struct ProvisionError {
    kind: ProvisionErrorKind,
    #[source]
    report: Report,
}

impl ProvisionError {
    /// Constructs a new provisioning error with the provided kind and
    /// diagnostic report.
    #[must_use]
    pub const fn new(kind: ProvisionErrorKind, report: Report) -> Self {
        Self { kind, report }
    }

    /// Returns the semantic category for this failure.
    #[must_use]
    pub const fn kind(&self) -> ProvisionErrorKind {
        self.kind
    }

    /// Adds context to the diagnostic report while keeping the kind.
    #[must_use]
    pub fn wrap_err<D>(self, message: D) -> Self
    where
        D: std::fmt::Display + Send + Sync + 'static,
    {
        Self::new(self.kind, self.report.wrap_err(message))
    }

    /// Extracts the underlying diagnostic report.
    pub fn into_report(self) -> Report {
        self.report
    }
}

impl From<Report> for ProvisionError {
    fn from(report: Report) -> Self {
        Self::new(ProvisionErrorKind::Other, report)
    }
}

/// Categorises supervision failures.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum ServerErrorKind {
    /// Represents errors without a more specific semantic meaning.
    #[default]
    Other,
    /// The `mongod` binary could not be provisioned.
    Provision,
    /// The data directory could not be created.
    DataDirectory,
    /// The `mongod` process could not be spawned.
    Launch,
    /// The orphan watchdog could not be spawned.
    Watchdog,
    /// No readiness or failure line arrived before the startup timeout.
    StartupTimeout,
    /// `mongod` reported an error or fatal log line, or exited before it was ready.
    StartupFailed,
    /// The replica-set initiation command failed.
    ReplicaSet,
}

/// Captures supervision failures.
#[derive(Debug, Error)]
#[error("{report}")]
pub struct ServerError {
    kind: ServerErrorKind,
    #[source]
    report: Report,
}

impl ServerError {
    /// Constructs a new supervision error with the provided kind and
    /// diagnostic report.
    #[must_use]
    pub const fn new(kind: ServerErrorKind, report: Report) -> Self {
        Self { kind, report }
    }

    /// Returns the semantic category for this failure.
    #[must_use]
    pub const fn kind(&self) -> ServerErrorKind {
        self.kind
    }

    /// Adds context to the diagnostic report while keeping the kind.
    #[must_use]
    pub fn wrap_err<D>(self, message: D) -> Self
    where
        D: std::fmt::Display + Send + Sync + 'static,
    {
        Self::new(self.kind, self.report.wrap_err(message))
    }

    /// Extracts the underlying diagnostic report.
    pub fn into_report(self) -> Report {
        self.report
    }
}

impl From<Report> for ServerError {
    fn from(report: Report) -> Self {
        Self::new(ServerErrorKind::Other, report)
    }
}

/// Captures configuration failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ConfigError(#[from] Report);
