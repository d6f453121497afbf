//! Filesystem helpers routed through `cap_std` directory handles.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{
    ambient_authority,
    fs::{Dir, Permissions, PermissionsExt},
};
use color_eyre::eyre::{Context, Result};
use std::io::ErrorKind;

/// Mode applied to extracted executables.
const EXECUTABLE_MODE: u32 = 0o755;

/// Splits `path` into a handle on its parent directory and the final component.
///
/// Relative paths without a parent resolve against the working directory.
fn open_parent(path: &Utf8Path) -> Result<(Dir, Utf8PathBuf)> {
    let name = path
        .file_name()
        .map(Utf8PathBuf::from)
        .ok_or_else(|| color_eyre::eyre::eyre!("{path} has no final component"))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .with_context(|| format!("open {parent}"))?;
    Ok((dir, name))
}

/// Creates `path` and any missing ancestors. Existing directories are accepted.
pub(crate) fn ensure_dir_exists(path: &Utf8Path) -> Result<()> {
    let root = if path.has_root() { "/" } else { "." };
    let relative = path.strip_prefix("/").unwrap_or(path);
    if relative.as_str().is_empty() {
        return Ok(());
    }
    let dir = Dir::open_ambient_dir(root, ambient_authority())
        .with_context(|| format!("open {root}"))?;
    match dir.create_dir_all(relative) {
        Err(err) if err.kind() != ErrorKind::AlreadyExists => {
            Err(err).with_context(|| format!("create {path}"))
        }
        _ => Ok(()),
    }
}

/// Marks the file at `path` as readable and executable by everyone.
pub(crate) fn mark_executable(path: &Utf8Path) -> Result<()> {
    let (dir, name) = open_parent(path)?;
    dir.set_permissions(&name, Permissions::from_mode(EXECUTABLE_MODE))
        .with_context(|| format!("chmod {path}"))
}

/// Outcome of removing a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemovalOutcome {
    /// The tree existed and was removed.
    Removed,
    /// Nothing existed at the path.
    Missing,
}

/// Removes `path` and everything beneath it, treating a missing tree as success.
pub(crate) fn remove_dir_tree(path: &Utf8Path) -> Result<RemovalOutcome> {
    let (dir, name) = match open_parent(path) {
        Ok(opened) => opened,
        Err(err) if is_not_found(&err) => return Ok(RemovalOutcome::Missing),
        Err(err) => return Err(err),
    };
    match dir.remove_dir_all(&name) {
        Ok(()) => Ok(RemovalOutcome::Removed),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RemovalOutcome::Missing),
        Err(err) => Err(err).with_context(|| format!("remove {path}")),
    }
}

fn is_not_found(err: &color_eyre::Report) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(|io| io.kind() == ErrorKind::NotFound)
}
