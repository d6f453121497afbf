//! Tests for the binary cache.

use super::*;
use crate::download::{DownloadSources, MockFetcher};
use crate::test_support::{AcceptAllSignatures, RecordingFetcher, sha256_hex, tar_gz};
use crate::version::VersionSpec;
use camino::Utf8Path;
use std::fs;
use tempfile::tempdir;

fn config_in(root: &Utf8Path) -> ProvisionConfig {
    let spec =
        VersionSpec::from_parts("5.0.2", "linux", "x86_64", Some("ubuntu2004")).expect("spec");
    ProvisionConfig::new(spec, &DownloadSources::default(), root).expect("config")
}

fn serving(config: &ProvisionConfig, archive: Vec<u8>) -> RecordingFetcher {
    RecordingFetcher::default()
        .with_resource(config.checksum_url(), sha256_hex(&archive).into_bytes())
        .with_resource(config.public_key_url(), b"key".to_vec())
        .with_resource(config.signature_url(), b"sig".to_vec())
        .with_resource(config.source_url(), archive)
}

#[test]
fn existing_entry_is_returned_without_fetching() {
    let temp = tempdir().expect("tempdir");
    let root = Utf8Path::from_path(temp.path()).expect("utf8 path");
    let config = config_in(root);
    fs::create_dir_all(config.cache_path().parent().expect("entry dir")).expect("create entry");
    fs::write(config.cache_path(), b"cached").expect("write entry");

    let mut fetcher = MockFetcher::new();
    fetcher.expect_fetch().never();
    let cache = BinaryCache::new(Arc::new(fetcher), Arc::new(AcceptAllSignatures));

    let path = cache.ensure_available(&config).expect("cache hit");
    assert_eq!(path, config.cache_path());
    assert_eq!(fs::read(&path).expect("read"), b"cached");
}

#[test]
fn miss_publishes_the_extracted_binary() {
    let temp = tempdir().expect("tempdir");
    let root = Utf8Path::from_path(temp.path()).expect("utf8 path");
    let config = config_in(root);
    let fetcher = Arc::new(serving(
        &config,
        tar_gz(&[("mongodb/bin/mongod", b"#!/bin/sh\n".as_slice())]),
    ));
    let cache = BinaryCache::new(fetcher.clone(), Arc::new(AcceptAllSignatures));

    let path = cache.ensure_available(&config).expect("provision");
    assert_eq!(path, config.cache_path());
    assert_eq!(fs::read(&path).expect("read"), b"#!/bin/sh\n");
    assert_eq!(
        fetcher.calls(),
        vec![
            config.source_url().to_owned(),
            config.checksum_url(),
            config.public_key_url().to_owned(),
            config.signature_url(),
        ]
    );
    assert!(fetcher.issued_paths().iter().all(|issued| !issued.exists()));

    let entry = fs::read_dir(path.parent().expect("entry dir"))
        .expect("list entry")
        .count();
    assert_eq!(entry, 1, "only the published binary remains in the entry");
}

#[test]
fn transport_failure_leaves_no_entry() {
    let temp = tempdir().expect("tempdir");
    let root = Utf8Path::from_path(temp.path()).expect("utf8 path");
    let config = config_in(root);

    let mut fetcher = MockFetcher::new();
    fetcher.expect_fetch().times(1).returning(|url| {
        Err(ProvisionError::new(
            ProvisionErrorKind::Transport,
            eyre!("connection reset fetching {url}"),
        ))
    });
    let cache = BinaryCache::new(Arc::new(fetcher), Arc::new(AcceptAllSignatures));

    let err = cache.ensure_available(&config).expect_err("fetch fails");
    assert_eq!(err.kind(), ProvisionErrorKind::Transport);
    assert!(!config.cache_path().exists());
}

#[test]
fn archive_without_binary_leaves_only_the_empty_entry_directory() {
    let temp = tempdir().expect("tempdir");
    let root = Utf8Path::from_path(temp.path()).expect("utf8 path");
    let config = config_in(root);
    let fetcher = Arc::new(serving(&config, tar_gz(&[("mongodb/README", b"hi".as_slice())])));
    let cache = BinaryCache::new(fetcher, Arc::new(AcceptAllSignatures));

    let err = cache.ensure_available(&config).expect_err("no binary");
    assert_eq!(err.kind(), ProvisionErrorKind::BinaryNotFound);
    assert!(!config.cache_path().exists());
    let entry_dir = config.cache_path().parent().expect("entry dir");
    assert_eq!(fs::read_dir(entry_dir).expect("list").count(), 0);
}
