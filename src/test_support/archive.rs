//! Builders for release archives and their checksums.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};

/// Builds an in-memory `.tgz` holding `entries` in order.
///
/// # Panics
///
/// Panics if the archive cannot be assembled in memory.
#[must_use]
pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *contents)
            .unwrap_or_else(|err| panic!("append {path}: {err}"));
    }
    let mut encoder = builder
        .into_inner()
        .unwrap_or_else(|err| panic!("finish tar: {err}"));
    encoder
        .flush()
        .unwrap_or_else(|err| panic!("flush gzip: {err}"));
    encoder
        .finish()
        .unwrap_or_else(|err| panic!("finish gzip: {err}"))
}

/// Returns the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let result = Sha256::digest(bytes);
    format!("{result:x}")
}
