//! Recording fakes for the network-facing capabilities.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use color_eyre::eyre::eyre;
use tempfile::NamedTempFile;

use crate::download::{Fetcher, SignatureVerifier};
use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::server::ReplicaSetInitiator;

#[derive(Debug, Default)]
struct FetchLog {
    calls: Vec<String>,
    issued: Vec<PathBuf>,
}

/// In-memory [`Fetcher`] that serves registered resources and records every
/// request.
///
/// Unregistered URLs fail with [`ProvisionErrorKind::HttpStatus`] `404`.
#[derive(Debug, Default)]
pub struct RecordingFetcher {
    resources: BTreeMap<String, Vec<u8>>,
    log: Mutex<FetchLog>,
}

impl RecordingFetcher {
    /// Serves `body` for `url`.
    #[must_use]
    pub fn with_resource(mut self, url: impl Into<String>, body: Vec<u8>) -> Self {
        self.resources.insert(url.into(), body);
        self
    }

    /// Returns the requested URLs in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .clone()
    }

    /// Returns the path of every temporary file handed out.
    #[must_use]
    pub fn issued_paths(&self) -> Vec<PathBuf> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .issued
            .clone()
    }
}

impl Fetcher for RecordingFetcher {
    fn fetch(&self, url: &str) -> ProvisionResult<NamedTempFile> {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.calls.push(url.to_owned());
        let body = self.resources.get(url).ok_or_else(|| {
            ProvisionError::new(
                ProvisionErrorKind::HttpStatus(404),
                eyre!("invalid status code 404 for {url}"),
            )
        })?;

        let mut file = NamedTempFile::new().map_err(|err| {
            ProvisionError::new(ProvisionErrorKind::Filesystem, eyre!(err))
        })?;
        file.write_all(body)
            .and_then(|()| file.as_file_mut().seek(SeekFrom::Start(0)))
            .map_err(|err| ProvisionError::new(ProvisionErrorKind::Filesystem, eyre!(err)))?;
        log.issued.push(file.path().to_path_buf());
        Ok(file)
    }
}

/// [`SignatureVerifier`] that accepts every signature after draining its inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllSignatures;

impl SignatureVerifier for AcceptAllSignatures {
    fn verify(
        &self,
        key: &mut dyn Read,
        signature: &mut dyn Read,
        data: &mut dyn Read,
    ) -> color_eyre::Result<()> {
        io::copy(key, &mut io::sink())?;
        io::copy(signature, &mut io::sink())?;
        io::copy(data, &mut io::sink())?;
        Ok(())
    }
}

/// [`ReplicaSetInitiator`] that records each request and optionally fails.
#[derive(Debug, Default)]
pub struct RecordingInitiator {
    failure: Option<String>,
    calls: Mutex<Vec<(String, String, u16)>>,
}

impl RecordingInitiator {
    /// Fails every initiation with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            calls: Mutex::default(),
        }
    }

    /// Returns each `(uri, replica set, port)` request in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String, u16)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ReplicaSetInitiator for RecordingInitiator {
    async fn initiate(&self, uri: &str, replica_set: &str, port: u16) -> color_eyre::Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((uri.to_owned(), replica_set.to_owned(), port));
        self.failure
            .as_ref()
            .map_or(Ok(()), |message| Err(eyre!("{message}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_all_drains_every_input() {
        let mut key = io::Cursor::new(b"key".to_vec());
        let mut signature = io::Cursor::new(b"signature".to_vec());
        let mut data = io::Cursor::new(b"data".to_vec());

        AcceptAllSignatures
            .verify(&mut key, &mut signature, &mut data)
            .expect("accept-all verifier should not fail");

        assert_eq!(key.position(), 3);
        assert_eq!(signature.position(), 9);
        assert_eq!(data.position(), 4);
    }
}
