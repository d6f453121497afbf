//! HTTP transport used to retrieve archives, checksums, signatures, and keys.

use std::io::{Seek, SeekFrom};
use std::time::Duration;

use color_eyre::eyre::eyre;
use reqwest::StatusCode;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::observability::DOWNLOAD_LOG_TARGET;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Retrieves a URL into a temporary file.
///
/// Implementations return the file rewound to its start. The file is deleted
/// when the returned handle drops, so callers that need the bytes afterwards
/// must copy them out first.
#[cfg_attr(test, mockall::automock)]
pub trait Fetcher: Send + Sync {
    /// Downloads `url` into a fresh temporary file.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionErrorKind::Transport`] when the request cannot be
    /// completed and [`ProvisionErrorKind::HttpStatus`] for any status other
    /// than `200 OK`.
    fn fetch(&self, url: &str) -> ProvisionResult<NamedTempFile>;
}

/// Blocking [`Fetcher`] backed by `reqwest`.
///
/// There is no overall deadline. The blocking client applies its timeout to
/// each wait on the connection (response headers, then every body read), so
/// a slow download keeps going as long as bytes keep arriving.
#[derive(Debug, Clone, Copy)]
pub struct HttpFetcher {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl HttpFetcher {
    /// Overrides how long a single wait for response data may stall.
    #[must_use]
    pub const fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    fn client(&self) -> ProvisionResult<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .build()
            .map_err(|err| {
                ProvisionError::new(
                    ProvisionErrorKind::Transport,
                    eyre!(err).wrap_err("failed to build HTTP client"),
                )
            })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
        }
    }
}

fn transport(err: impl Into<color_eyre::Report>, context: String) -> ProvisionError {
    ProvisionError::new(ProvisionErrorKind::Transport, err.into().wrap_err(context))
}

fn filesystem(err: std::io::Error, context: &'static str) -> ProvisionError {
    ProvisionError::new(ProvisionErrorKind::Filesystem, eyre!(err).wrap_err(context))
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> ProvisionResult<NamedTempFile> {
        info!(target: DOWNLOAD_LOG_TARGET, url, "downloading");
        // The blocking client owns its own runtime; building it per call keeps
        // construction and teardown inside whichever thread performs the fetch.
        let client = self.client()?;
        let mut response = client
            .get(url)
            .send()
            .map_err(|err| transport(err, format!("failed to request {url}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ProvisionError::new(
                ProvisionErrorKind::HttpStatus(status.as_u16()),
                eyre!("invalid status code {} for {url}", status.as_u16()),
            ));
        }

        let mut file = NamedTempFile::new().map_err(|err| filesystem(err, "create download file"))?;
        let bytes = response
            .copy_to(file.as_file_mut())
            .map_err(|err| transport(err, format!("failed to read body of {url}")))?;
        file.as_file_mut()
            .seek(SeekFrom::Start(0))
            .map_err(|err| filesystem(err, "rewind download file"))?;

        debug!(target: DOWNLOAD_LOG_TARGET, url, bytes, path = %file.path().display(), "download stored");
        info!(target: DOWNLOAD_LOG_TARGET, url, bytes, "download complete");
        Ok(file)
    }
}
