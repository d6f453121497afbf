//! Pulls the `mongod` executable out of a gzip-compressed tar archive.

use std::io::{self, Read, Seek, SeekFrom, Write};

use camino::Utf8Path;
use color_eyre::eyre::eyre;
use flate2::read::GzDecoder;
use tempfile::TempPath;
use tracing::debug;

use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::fs::mark_executable;
use crate::observability::DOWNLOAD_LOG_TARGET;

const BINARY_SUFFIX: &str = "bin/mongod";

fn filesystem(err: impl Into<color_eyre::Report>, context: String) -> ProvisionError {
    ProvisionError::new(ProvisionErrorKind::Filesystem, err.into().wrap_err(context))
}

/// Copies the first entry whose path ends in `bin/mongod` into an executable
/// temporary file created inside `temp_dir`.
///
/// The returned path is deleted on drop unless the caller persists it, so a
/// failure anywhere between extraction and publication leaves nothing behind.
/// Creating it beside the final location keeps the later rename on one
/// filesystem.
pub(crate) fn extract_binary<R: Read + Seek>(
    archive: &mut R,
    temp_dir: &Utf8Path,
) -> ProvisionResult<TempPath> {
    archive
        .seek(SeekFrom::Start(0))
        .map_err(|err| filesystem(err, "rewind archive".to_owned()))?;
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    let entries = tar
        .entries()
        .map_err(|err| filesystem(err, "read tar archive".to_owned()))?;

    for item in entries {
        let mut entry = item.map_err(|err| filesystem(err, "read tar entry".to_owned()))?;
        let path = entry
            .path()
            .map_err(|err| filesystem(err, "decode tar entry path".to_owned()))?
            .to_string_lossy()
            .into_owned();
        if !path.ends_with(BINARY_SUFFIX) {
            continue;
        }

        debug!(target: DOWNLOAD_LOG_TARGET, entry = %path, "extracting mongod");
        let mut binary = tempfile::Builder::new()
            .prefix(".mongod-")
            .tempfile_in(temp_dir)
            .map_err(|err| filesystem(err, format!("create temporary binary in {temp_dir}")))?;
        io::copy(&mut entry, binary.as_file_mut())
            .map_err(|err| filesystem(err, format!("extract {path}")))?;
        binary
            .as_file_mut()
            .flush()
            .map_err(|err| filesystem(err, format!("flush {path}")))?;
        let temp_path = binary.into_temp_path();
        let utf8 = Utf8Path::from_path(&temp_path)
            .ok_or_else(|| filesystem(eyre!("non UTF-8 path"), "mark binary executable".to_owned()))?;
        mark_executable(utf8).map_err(|err| filesystem(err, "mark binary executable".to_owned()))?;
        return Ok(temp_path);
    }

    Err(ProvisionError::new(
        ProvisionErrorKind::BinaryNotFound,
        eyre!("did not find a mongod binary in the tar file"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tar_gz;
    use camino::Utf8PathBuf;
    use std::io::Cursor;

    fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 tempdir");
        (dir, path)
    }

    #[test]
    fn extracts_the_first_matching_entry() {
        let (_guard, dir) = temp_dir();
        let archive = tar_gz(&[
            ("mongodb-linux/README", b"readme".as_slice()),
            ("mongodb-linux/bin/mongod", b"first".as_slice()),
            ("other/bin/mongod", b"second".as_slice()),
        ]);

        let binary = extract_binary(&mut Cursor::new(archive), &dir).expect("extract");
        assert_eq!(std::fs::read(&binary).expect("read binary"), b"first");
        assert!(binary.starts_with(dir.as_std_path()));
    }

    #[cfg(unix)]
    #[test]
    fn extracted_binary_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let (_guard, dir) = temp_dir();
        let archive = tar_gz(&[("x/bin/mongod", b"#!/bin/sh\n".as_slice())]);
        let binary = extract_binary(&mut Cursor::new(archive), &dir).expect("extract");
        let mode = std::fs::metadata(&binary).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn archive_without_mongod_reports_binary_not_found() {
        let (_guard, dir) = temp_dir();
        let archive = tar_gz(&[("x/bin/mongos", b"router".as_slice())]);
        let err = extract_binary(&mut Cursor::new(archive), &dir).expect_err("no binary");
        assert_eq!(err.kind(), ProvisionErrorKind::BinaryNotFound);
        assert_eq!(std::fs::read_dir(&dir).expect("list").count(), 0);
    }

    #[test]
    fn corrupt_archive_is_a_filesystem_error() {
        let (_guard, dir) = temp_dir();
        let err = extract_binary(&mut Cursor::new(b"not gzip".to_vec()), &dir)
            .expect_err("corrupt archive");
        assert_eq!(err.kind(), ProvisionErrorKind::Filesystem);
    }
}
