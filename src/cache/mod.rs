//! Persistent on-disk cache of verified `mongod` binaries.
//!
//! Each archive URL maps to one entry, `<root>/mongo-in-memory/<archive>/mongod`.
//! The presence of that file is the only record that a build has been
//! provisioned: there is no metadata or lock file. Entries are published by
//! renaming a fully written temporary file into place, so concurrent callers
//! targeting the same entry observe either no file or a complete one.
//!
//! # Cache Location
//!
//! The cache root is resolved in the following order:
//!
//! 1. `MONGO_BINARY_CACHE_DIR` environment variable if set
//! 2. `XDG_CACHE_HOME` if set
//! 3. `~/Library/Caches` on macOS or `~/.cache` on Linux

mod config;

pub use config::{BINARY_NAME, CACHE_DIR_ENV, CACHE_NAMESPACE, build_cache_path, resolve_cache_root};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use camino::Utf8PathBuf;
use color_eyre::eyre::eyre;
use tracing::info;

use crate::download::{Fetcher, ProvisionConfig, SignatureVerifier, extract_binary, verify_archive};
use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::fs::ensure_dir_exists;
use crate::observability::CACHE_LOG_TARGET;

/// Returns verified binaries from the cache, provisioning them on a miss.
#[derive(Clone)]
pub struct BinaryCache {
    fetcher: Arc<dyn Fetcher>,
    signatures: Arc<dyn SignatureVerifier>,
}

impl fmt::Debug for BinaryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryCache").finish_non_exhaustive()
    }
}

fn filesystem(err: impl Into<color_eyre::Report>, context: String) -> ProvisionError {
    ProvisionError::new(ProvisionErrorKind::Filesystem, err.into().wrap_err(context))
}

impl BinaryCache {
    /// Builds a cache that downloads through `fetcher` and checks signatures
    /// with `signatures`.
    #[must_use]
    pub const fn new(fetcher: Arc<dyn Fetcher>, signatures: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            fetcher,
            signatures,
        }
    }

    /// Returns the path of a usable `mongod` for `config`.
    ///
    /// An existing file at the cache path is trusted without re-verification
    /// and no network request is made. Otherwise the archive is fetched,
    /// verified, and extracted, and the binary is renamed into place. Every
    /// temporary file is removed whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`ProvisionError`] describing the first stage that failed.
    /// Nothing is published at the cache path in that case.
    pub fn ensure_available(&self, config: &ProvisionConfig) -> ProvisionResult<Utf8PathBuf> {
        let cache_path = config.cache_path();
        let present = cache_path
            .try_exists()
            .map_err(|err| filesystem(err, format!("inspect {cache_path}")))?;
        if present {
            info!(target: CACHE_LOG_TARGET, path = %cache_path, "cache hit");
            return Ok(cache_path.to_path_buf());
        }

        let started = Instant::now();
        let mut archive = self.fetcher.fetch(config.source_url())?;
        verify_archive(
            self.fetcher.as_ref(),
            self.signatures.as_ref(),
            archive.as_file_mut(),
            config,
        )?;

        let entry_dir = cache_path
            .parent()
            .ok_or_else(|| filesystem(eyre!("no parent directory"), format!("publish {cache_path}")))?;
        ensure_dir_exists(entry_dir).map_err(|err| filesystem(err, format!("create {entry_dir}")))?;
        let binary = extract_binary(archive.as_file_mut(), entry_dir)?;
        binary
            .persist(cache_path)
            .map_err(|err| filesystem(err.error, format!("publish {cache_path}")))?;

        info!(
            target: CACHE_LOG_TARGET,
            path = %cache_path,
            url = config.source_url(),
            elapsed_ms = started.elapsed().as_millis(),
            "binary published to cache"
        );
        Ok(cache_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests;
