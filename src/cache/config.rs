//! Cache root resolution and the URL-to-path mapping.
//!
//! Resolves the cache root from environment variables with XDG-compliant
//! fallback paths, then maps each download URL to its own entry beneath it.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{ResolveError, ResolveResult};
use crate::platform::HostSystem;

/// Directory created beneath the cache root for every entry.
pub const CACHE_NAMESPACE: &str = "mongo-in-memory";

/// Environment variable that overrides the cache root.
pub const CACHE_DIR_ENV: &str = "MONGO_BINARY_CACHE_DIR";

/// File name of the cached executable inside an entry.
pub const BINARY_NAME: &str = "mongod";

/// Resolves the cache root for `host`.
///
/// The resolution order is:
///
/// 1. `MONGO_BINARY_CACHE_DIR` if set and not blank
/// 2. `XDG_CACHE_HOME` if set and not blank
/// 3. `$HOME/Library/Caches` on macOS, `$HOME/.cache` on Linux
///
/// # Errors
///
/// Returns [`ResolveError::UnsupportedSystem`] for any other operating system
/// or when `HOME` is unset.
///
/// # Examples
///
/// ```
/// use mongo_in_memory::cache::resolve_cache_root;
/// use mongo_in_memory::test_support::FakeHost;
///
/// let host = FakeHost::linux().with_var("HOME", "/home/ci");
/// assert_eq!(resolve_cache_root(&host)?.as_str(), "/home/ci/.cache");
/// # Ok::<(), mongo_in_memory::ResolveError>(())
/// ```
pub fn resolve_cache_root(host: &dyn HostSystem) -> ResolveResult<Utf8PathBuf> {
    if let Some(dir) = non_blank(host, CACHE_DIR_ENV) {
        return Ok(dir);
    }
    if let Some(dir) = non_blank(host, "XDG_CACHE_HOME") {
        return Ok(dir);
    }

    let os = host.os();
    let suffix = match os {
        "macos" | "darwin" => "Library/Caches",
        "linux" => ".cache",
        other => {
            return Err(ResolveError::UnsupportedSystem(format!(
                "no cache directory convention for OS '{other}'"
            )));
        }
    };
    let home = non_blank(host, "HOME").ok_or_else(|| {
        ResolveError::UnsupportedSystem("HOME is not set; cannot locate a cache directory".into())
    })?;
    Ok(home.join(suffix))
}

fn non_blank(host: &dyn HostSystem, key: &str) -> Option<Utf8PathBuf> {
    let raw = host.var(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(Utf8PathBuf::from(trimmed))
}

/// Maps a download URL to `<root>/mongo-in-memory/<archive basename>/mongod`.
///
/// # Errors
///
/// Returns [`ResolveError::InvalidUrl`] when `url` cannot be parsed or has no
/// final path segment.
pub fn build_cache_path(root: &Utf8Path, url: &str) -> ResolveResult<Utf8PathBuf> {
    let invalid = |reason: String| ResolveError::InvalidUrl {
        url: url.to_owned(),
        reason,
    };
    let parsed = reqwest::Url::parse(url).map_err(|err| invalid(err.to_string()))?;
    let basename = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| invalid("URL has no file name".to_owned()))?;
    Ok(root.join(CACHE_NAMESPACE).join(basename).join(BINARY_NAME))
}
