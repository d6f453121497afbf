//! Exercises the download, verification, extraction, and cache pipeline
//! end to end against in-memory resources.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use mongo_in_memory::test_support::{
    AcceptAllSignatures, FakeHost, RecordingFetcher, StaticOsRelease, sha256_hex, tar_gz,
};
use mongo_in_memory::{
    BinaryCache, MongoError, MongoLauncher, OpenPgpVerifier, ProvisionConfig, ProvisionErrorKind,
    StartOptions,
};
use rstest::{fixture, rstest};
use tempfile::TempDir;

const VERSION: &str = "5.0.2";

struct Sandbox {
    _dir: TempDir,
    root: Utf8PathBuf,
}

#[fixture]
fn sandbox() -> Sandbox {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 tempdir");
    Sandbox { _dir: dir, root }
}

fn launcher() -> MongoLauncher {
    MongoLauncher::default()
        .with_host(Arc::new(FakeHost::linux()))
        .with_os_release(Arc::new(StaticOsRelease::new("ubuntu", "20.04")))
}

fn config(root: &Utf8Path) -> ProvisionConfig {
    launcher()
        .provision_config(VERSION, &StartOptions::default().with_cache_root(root))
        .expect("config")
}

fn release(config: &ProvisionConfig, archive: Vec<u8>, checksum: String) -> RecordingFetcher {
    RecordingFetcher::default()
        .with_resource(config.source_url(), archive)
        .with_resource(config.checksum_url(), checksum.into_bytes())
        .with_resource(config.public_key_url(), b"-----BEGIN PGP PUBLIC KEY BLOCK-----".to_vec())
        .with_resource(config.signature_url(), b"-----BEGIN PGP SIGNATURE-----".to_vec())
}

fn provision_error_kind(err: MongoError) -> ProvisionErrorKind {
    match err {
        MongoError::Provision(inner) => inner.kind(),
        other => panic!("expected a provisioning error, got {other}"),
    }
}

#[rstest]
fn second_call_is_served_from_the_cache(sandbox: Sandbox) {
    let config = config(&sandbox.root);
    let archive = tar_gz(&[
        ("mongodb-linux-x86_64-ubuntu2004-5.0.2/LICENSE", b"license".as_slice()),
        ("mongodb-linux-x86_64-ubuntu2004-5.0.2/bin/mongod", b"binary".as_slice()),
    ]);
    let checksum = format!("{}  archive.tgz\n", sha256_hex(&archive));
    let fetcher = Arc::new(release(&config, archive, checksum));
    let launcher = launcher()
        .with_fetcher(fetcher.clone())
        .with_signature_verifier(Arc::new(AcceptAllSignatures));
    let options = StartOptions::default().with_cache_root(&sandbox.root);

    let first = launcher.ensure_binary(VERSION, &options).expect("provision");
    let calls_after_first = fetcher.calls().len();
    let second = launcher.ensure_binary(VERSION, &options).expect("cache hit");

    assert_eq!(first, second);
    assert_eq!(first, config.cache_path());
    assert_eq!(calls_after_first, 4);
    assert_eq!(fetcher.calls().len(), calls_after_first, "cache hit must not fetch");
    assert_eq!(std::fs::read(&first).expect("read"), b"binary");
}

#[rstest]
fn checksum_mismatch_cleans_up_every_temporary_file(sandbox: Sandbox) {
    let config = config(&sandbox.root);
    let archive = tar_gz(&[("x/bin/mongod", b"binary".as_slice())]);
    let fetcher = Arc::new(release(&config, archive, "deadbeef archive.tgz".to_owned()));
    let cache = BinaryCache::new(fetcher.clone(), Arc::new(AcceptAllSignatures));

    let err = cache.ensure_available(&config).expect_err("checksum must fail");

    assert_eq!(err.kind(), ProvisionErrorKind::ChecksumFailed);
    assert!(!config.cache_path().exists());
    let issued = fetcher.issued_paths();
    assert_eq!(issued.len(), 2, "archive and checksum were fetched");
    assert!(issued.iter().all(|path| !path.exists()));
}

#[rstest]
fn archive_without_mongod_is_reported(sandbox: Sandbox) {
    let config = config(&sandbox.root);
    let archive = tar_gz(&[("x/bin/mongos", b"router".as_slice())]);
    let checksum = sha256_hex(&archive);
    let launcher = launcher()
        .with_fetcher(Arc::new(release(&config, archive, checksum)))
        .with_signature_verifier(Arc::new(AcceptAllSignatures));

    let err = launcher
        .ensure_binary(VERSION, &StartOptions::default().with_cache_root(&sandbox.root))
        .expect_err("no binary");
    assert_eq!(provision_error_kind(err), ProvisionErrorKind::BinaryNotFound);
    assert!(!config.cache_path().exists());
}

#[rstest]
fn missing_archive_surfaces_the_status_code(sandbox: Sandbox) {
    let launcher = launcher()
        .with_fetcher(Arc::new(RecordingFetcher::default()))
        .with_signature_verifier(Arc::new(AcceptAllSignatures));

    let err = launcher
        .ensure_binary(VERSION, &StartOptions::default().with_cache_root(&sandbox.root))
        .expect_err("404");
    assert_eq!(provision_error_kind(err), ProvisionErrorKind::HttpStatus(404));
}

#[rstest]
fn unparseable_signing_key_fails_signature_verification(sandbox: Sandbox) {
    let config = config(&sandbox.root);
    let archive = tar_gz(&[("x/bin/mongod", b"binary".as_slice())]);
    let checksum = sha256_hex(&archive);
    let fetcher = Arc::new(release(&config, archive, checksum));
    let cache = BinaryCache::new(fetcher.clone(), Arc::new(OpenPgpVerifier));

    let err = cache.ensure_available(&config).expect_err("signature must fail");
    assert_eq!(err.kind(), ProvisionErrorKind::SignatureFailed);
    assert!(!config.cache_path().exists());
    assert!(fetcher.issued_paths().iter().all(|path| !path.exists()));
}
