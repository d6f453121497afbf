//! Integrity checks run against a downloaded archive before it is extracted.
//!
//! Verification happens in two stages: the archive digest must match the
//! published `.sha256` sidecar, then the `.sig` sidecar must verify against
//! the release-line signing key. Each sidecar is fetched into its own
//! temporary file and removed when the stage finishes, whatever the outcome.

use std::io::{self, Read, Seek, SeekFrom};

use color_eyre::eyre::{Context, eyre};
use pgp::{Deserializable, SignedPublicKey, StandaloneSignature};
use sha2::{Digest, Sha256};
use tracing::info;

use super::{Fetcher, ProvisionConfig};
use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::observability::DOWNLOAD_LOG_TARGET;

/// Checks a detached signature over arbitrary data.
#[cfg_attr(test, mockall::automock)]
pub trait SignatureVerifier: Send + Sync {
    /// Verifies `signature` over `data` using any key found in `key`.
    ///
    /// # Errors
    ///
    /// Returns an error when the key or signature cannot be parsed or when no
    /// key validates the signature.
    fn verify(
        &self,
        key: &mut dyn Read,
        signature: &mut dyn Read,
        data: &mut dyn Read,
    ) -> color_eyre::Result<()>;
}

/// [`SignatureVerifier`] for ASCII-armored OpenPGP keys and signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenPgpVerifier;

impl SignatureVerifier for OpenPgpVerifier {
    fn verify(
        &self,
        key: &mut dyn Read,
        signature: &mut dyn Read,
        data: &mut dyn Read,
    ) -> color_eyre::Result<()> {
        let mut armored_key = Vec::new();
        key.read_to_end(&mut armored_key)
            .context("read signing key")?;
        let (parsed, _) = SignedPublicKey::from_armor_many(&armored_key[..])
            .map_err(|err| eyre!(err).wrap_err("parse signing key"))?;
        let keys = parsed
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| eyre!(err).wrap_err("parse signing key"))?;
        if keys.is_empty() {
            return Err(eyre!("signing key file contains no public keys"));
        }

        let mut armored_signature = Vec::new();
        signature
            .read_to_end(&mut armored_signature)
            .context("read signature")?;
        let (detached, _) = StandaloneSignature::from_armor_single(&armored_signature[..])
            .map_err(|err| eyre!(err).wrap_err("parse detached signature"))?;

        let mut content = Vec::new();
        data.read_to_end(&mut content).context("read signed data")?;

        let verified = keys.iter().any(|public| {
            detached.verify(public, &content).is_ok()
                || public
                    .public_subkeys
                    .iter()
                    .any(|subkey| detached.verify(subkey, &content).is_ok())
        });
        if verified {
            Ok(())
        } else {
            Err(eyre!("signature does not match any key in the key file"))
        }
    }
}

fn rewind(archive: &mut std::fs::File) -> ProvisionResult<()> {
    archive.seek(SeekFrom::Start(0)).map_err(|err| {
        ProvisionError::new(
            ProvisionErrorKind::Filesystem,
            eyre!(err).wrap_err("rewind archive"),
        )
    })?;
    Ok(())
}

fn sha256_hex(archive: &mut std::fs::File) -> ProvisionResult<String> {
    rewind(archive)?;
    let mut hasher = Sha256::new();
    io::copy(archive, &mut hasher).map_err(|err| {
        ProvisionError::new(
            ProvisionErrorKind::Filesystem,
            eyre!(err).wrap_err("hash archive"),
        )
    })?;
    rewind(archive)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Parses a `.sha256` sidecar. Only the first whitespace-separated token is
/// the digest; anything after it (usually the archive name) is ignored.
fn expected_digest(sidecar: &str) -> Option<String> {
    sidecar
        .split_whitespace()
        .next()
        .map(str::to_ascii_lowercase)
}

fn verify_checksum(
    fetcher: &dyn Fetcher,
    archive: &mut std::fs::File,
    config: &ProvisionConfig,
) -> ProvisionResult<()> {
    let url = config.checksum_url();
    let mut sidecar = fetcher
        .fetch(&url)
        .map_err(|err| err.wrap_err(format!("failed to fetch checksum {url}")))?;
    let mut contents = String::new();
    sidecar
        .as_file_mut()
        .read_to_string(&mut contents)
        .map_err(|err| {
            ProvisionError::new(
                ProvisionErrorKind::ChecksumFailed,
                eyre!(err).wrap_err(format!("checksum file {url} is not readable text")),
            )
        })?;
    let expected = expected_digest(&contents).ok_or_else(|| {
        ProvisionError::new(
            ProvisionErrorKind::ChecksumFailed,
            eyre!("checksum file {url} is empty"),
        )
    })?;

    let actual = sha256_hex(archive)?;
    if actual != expected {
        return Err(ProvisionError::new(
            ProvisionErrorKind::ChecksumFailed,
            eyre!(
                "checksum mismatch for {}: expected {expected}, got {actual}",
                config.source_url()
            ),
        ));
    }
    info!(target: DOWNLOAD_LOG_TARGET, url = config.source_url(), sha256 = %actual, "checksum verified");
    Ok(())
}

fn verify_signature(
    fetcher: &dyn Fetcher,
    signatures: &dyn SignatureVerifier,
    archive: &mut std::fs::File,
    config: &ProvisionConfig,
) -> ProvisionResult<()> {
    let key_url = config.public_key_url();
    let mut key = fetcher
        .fetch(key_url)
        .map_err(|err| err.wrap_err(format!("failed to fetch signing key {key_url}")))?;
    let signature_url = config.signature_url();
    let mut signature = fetcher
        .fetch(&signature_url)
        .map_err(|err| err.wrap_err(format!("failed to fetch signature {signature_url}")))?;

    rewind(archive)?;
    signatures
        .verify(key.as_file_mut(), signature.as_file_mut(), archive)
        .map_err(|err| {
            ProvisionError::new(
                ProvisionErrorKind::SignatureFailed,
                err.wrap_err(format!(
                    "signature verification failed for {}",
                    config.source_url()
                )),
            )
        })?;
    rewind(archive)?;
    info!(target: DOWNLOAD_LOG_TARGET, url = config.source_url(), key = key_url, "signature verified");
    Ok(())
}

/// Runs the checksum stage and then the signature stage against `archive`.
///
/// The archive is left rewound to its start on success.
pub(crate) fn verify_archive(
    fetcher: &dyn Fetcher,
    signatures: &dyn SignatureVerifier,
    archive: &mut std::fs::File,
    config: &ProvisionConfig,
) -> ProvisionResult<()> {
    verify_checksum(fetcher, archive, config)?;
    verify_signature(fetcher, signatures, archive, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{AcceptAllSignatures, RecordingFetcher, sha256_hex as digest};
    use crate::version::VersionSpec;
    use camino::Utf8Path;
    use rstest::rstest;
    use std::io::Write;

    fn config() -> ProvisionConfig {
        let spec = VersionSpec::from_parts("5.0.2", "linux", "x86_64", Some("ubuntu2004"))
            .expect("spec");
        ProvisionConfig::new(spec, &super::super::DownloadSources::default(), Utf8Path::new("/c"))
            .expect("config")
    }

    fn archive_with(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp archive");
        file.write_all(bytes).expect("write archive");
        file
    }

    #[rstest]
    #[case("{digest}")]
    #[case("{digest}  mongodb-linux-x86_64-ubuntu2004-5.0.2.tgz\n")]
    #[case("{DIGEST}\tarchive.tgz")]
    fn accepts_matching_sidecar_formats(#[case] template: &str) {
        let bytes = b"archive bytes";
        let hex = digest(bytes);
        let sidecar = template
            .replace("{digest}", &hex)
            .replace("{DIGEST}", &hex.to_ascii_uppercase());
        let config = config();
        let fetcher = RecordingFetcher::default()
            .with_resource(config.checksum_url(), sidecar.into_bytes())
            .with_resource(config.public_key_url(), b"key".to_vec())
            .with_resource(config.signature_url(), b"sig".to_vec());
        let mut archive = archive_with(bytes);

        verify_archive(&fetcher, &AcceptAllSignatures, archive.as_file_mut(), &config)
            .expect("archive should verify");
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[test]
    fn mismatched_digest_fails_before_the_signature_is_fetched() {
        let config = config();
        let fetcher = RecordingFetcher::default()
            .with_resource(config.checksum_url(), b"deadbeef archive.tgz".to_vec());
        let mut archive = archive_with(b"archive bytes");

        let err = verify_archive(&fetcher, &AcceptAllSignatures, archive.as_file_mut(), &config)
            .expect_err("digest mismatch must fail");
        assert_eq!(err.kind(), ProvisionErrorKind::ChecksumFailed);
        assert_eq!(fetcher.calls(), vec![config.checksum_url()]);
        assert!(fetcher.issued_paths().iter().all(|path| !path.exists()));
    }

    #[test]
    fn empty_sidecar_is_a_checksum_failure() {
        let config = config();
        let fetcher =
            RecordingFetcher::default().with_resource(config.checksum_url(), b"  \n".to_vec());
        let mut archive = archive_with(b"archive bytes");

        let err = verify_archive(&fetcher, &AcceptAllSignatures, archive.as_file_mut(), &config)
            .expect_err("empty sidecar must fail");
        assert_eq!(err.kind(), ProvisionErrorKind::ChecksumFailed);
    }

    #[test]
    fn rejected_signature_maps_to_signature_failed() {
        let bytes = b"archive bytes";
        let config = config();
        let fetcher = RecordingFetcher::default()
            .with_resource(config.checksum_url(), digest(bytes).into_bytes())
            .with_resource(config.public_key_url(), b"key".to_vec())
            .with_resource(config.signature_url(), b"sig".to_vec());
        let mut verifier = MockSignatureVerifier::new();
        verifier
            .expect_verify()
            .times(1)
            .returning(|_, _, _| Err(eyre!("bad signature")));
        let mut archive = archive_with(bytes);

        let err = verify_archive(&fetcher, &verifier, archive.as_file_mut(), &config)
            .expect_err("bad signature must fail");
        assert_eq!(err.kind(), ProvisionErrorKind::SignatureFailed);
        assert!(fetcher.issued_paths().iter().all(|path| !path.exists()));
    }

    // Primary key is certify-only; the signature comes from its signing subkey.
    const RELEASE_KEY: &[u8] = include_bytes!("fixtures/release-key.asc");
    const RELEASE_SIGNATURE: &[u8] = include_bytes!("fixtures/release-archive.sig");
    const SIGNED_BYTES: &[u8] = b"mongod release archive bytes\n";

    #[test]
    fn openpgp_verifier_accepts_a_subkey_signature() {
        OpenPgpVerifier
            .verify(
                &mut &RELEASE_KEY[..],
                &mut &RELEASE_SIGNATURE[..],
                &mut &SIGNED_BYTES[..],
            )
            .expect("genuine signature should verify");
    }

    #[rstest]
    #[case::altered(&b"mongod release archive bytes!\n"[..])]
    #[case::truncated(&b"mongod release"[..])]
    #[case::empty(&b""[..])]
    fn openpgp_verifier_rejects_tampered_data(#[case] tampered: &[u8]) {
        let err = OpenPgpVerifier
            .verify(
                &mut &RELEASE_KEY[..],
                &mut &RELEASE_SIGNATURE[..],
                &mut &tampered[..],
            )
            .expect_err("tampered data must not verify");
        assert!(err.to_string().contains("does not match"), "{err:?}");
    }

    #[test]
    fn genuine_archive_passes_both_checks_with_the_openpgp_verifier() {
        let config = config();
        let fetcher = RecordingFetcher::default()
            .with_resource(config.checksum_url(), digest(SIGNED_BYTES).into_bytes())
            .with_resource(config.public_key_url(), RELEASE_KEY.to_vec())
            .with_resource(config.signature_url(), RELEASE_SIGNATURE.to_vec());
        let mut archive = archive_with(SIGNED_BYTES);

        verify_archive(&fetcher, &OpenPgpVerifier, archive.as_file_mut(), &config)
            .expect("genuine archive should verify");
        assert!(fetcher.issued_paths().iter().all(|path| !path.exists()));
    }

    #[test]
    fn tampered_archive_is_a_signature_failure() {
        let tampered = b"mongod release archive bytes?\n";
        let config = config();
        let fetcher = RecordingFetcher::default()
            .with_resource(config.checksum_url(), digest(tampered).into_bytes())
            .with_resource(config.public_key_url(), RELEASE_KEY.to_vec())
            .with_resource(config.signature_url(), RELEASE_SIGNATURE.to_vec());
        let mut archive = archive_with(tampered);

        let err = verify_archive(&fetcher, &OpenPgpVerifier, archive.as_file_mut(), &config)
            .expect_err("tampered archive must fail");
        assert_eq!(err.kind(), ProvisionErrorKind::SignatureFailed);
    }

    #[test]
    fn openpgp_verifier_rejects_garbage_keys() {
        let err = OpenPgpVerifier
            .verify(
                &mut &b"not a key"[..],
                &mut &b"not a signature"[..],
                &mut &b"data"[..],
            )
            .expect_err("garbage key must not verify");
        assert!(err.to_string().contains("signing key"), "{err:?}");
    }
}
