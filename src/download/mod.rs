//! Download descriptors and the fetch, verify, and extract stages.
//!
//! A [`ProvisionConfig`] pairs the archive URL with the cache path derived
//! from it. The cache path depends only on the URL, so every process sharing a
//! cache root agrees on where a given build lives.

mod extract;
mod fetch;
mod verify;

pub(crate) use extract::extract_binary;
#[cfg(test)]
pub(crate) use fetch::MockFetcher;
pub use fetch::{Fetcher, HttpFetcher};
pub(crate) use verify::verify_archive;
pub use verify::{OpenPgpVerifier, SignatureVerifier};

use camino::{Utf8Path, Utf8PathBuf};

use crate::cache::build_cache_path;
use crate::error::ResolveResult;
use crate::version::VersionSpec;

/// Vendor host serving release archives and their sidecars.
pub const DEFAULT_DOWNLOAD_BASE: &str = "https://fastdl.mongodb.org";

/// Vendor host serving the per-release-line signing keys.
pub const DEFAULT_KEY_BASE: &str = "https://www.mongodb.org/static/pgp";

/// Where archives and signing keys are fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSources {
    download_base: String,
    key_base: String,
}

impl DownloadSources {
    /// Builds a source description from an archive base and a key base URL.
    #[must_use]
    pub fn new(download_base: impl Into<String>, key_base: impl Into<String>) -> Self {
        Self {
            download_base: download_base.into(),
            key_base: key_base.into(),
        }
    }

    /// Returns the base URL for archives.
    #[must_use]
    pub fn download_base(&self) -> &str {
        &self.download_base
    }

    /// Returns the base URL for signing keys.
    #[must_use]
    pub fn key_base(&self) -> &str {
        &self.key_base
    }
}

impl Default for DownloadSources {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_BASE, DEFAULT_KEY_BASE)
    }
}

/// Builds `<base>/<platform>/mongodb-<archive name>-<version>.tgz`.
///
/// # Examples
///
/// ```
/// use mongo_in_memory::{VersionSpec, build_download_url};
///
/// let spec = VersionSpec::from_parts("5.0.2", "linux", "x86_64", Some("ubuntu2004"))?;
/// assert_eq!(
///     build_download_url("https://fastdl.mongodb.org", &spec),
///     "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-ubuntu2004-5.0.2.tgz",
/// );
/// # Ok::<(), mongo_in_memory::ResolveError>(())
/// ```
#[must_use]
pub fn build_download_url(base: &str, spec: &VersionSpec) -> String {
    format!(
        "{}/{}/mongodb-{}-{}.tgz",
        base.trim_end_matches('/'),
        spec.platform().url_segment(),
        spec.archive_name(),
        spec.version_string(),
    )
}

/// Everything needed to provision one `mongod` build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    source_url: String,
    cache_path: Utf8PathBuf,
    key_url: String,
    version_spec: VersionSpec,
}

impl ProvisionConfig {
    /// Derives the archive URL, key URL, and cache path for `version_spec`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ResolveError::InvalidUrl`] when the download base does
    /// not produce a parseable URL.
    pub fn new(
        version_spec: VersionSpec,
        sources: &DownloadSources,
        cache_root: &Utf8Path,
    ) -> ResolveResult<Self> {
        let source_url = build_download_url(sources.download_base(), &version_spec);
        let cache_path = build_cache_path(cache_root, &source_url)?;
        let key_url = format!(
            "{}/server-{}.{}.asc",
            sources.key_base().trim_end_matches('/'),
            version_spec.major(),
            version_spec.minor(),
        );
        Ok(Self {
            source_url,
            cache_path,
            key_url,
            version_spec,
        })
    }

    /// Returns the archive URL.
    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Returns where the extracted binary lives once provisioned.
    #[must_use]
    pub fn cache_path(&self) -> &Utf8Path {
        &self.cache_path
    }

    /// Returns the resolved build.
    #[must_use]
    pub const fn version_spec(&self) -> &VersionSpec {
        &self.version_spec
    }

    /// Returns the URL of the SHA-256 sidecar.
    #[must_use]
    pub fn checksum_url(&self) -> String {
        format!("{}.sha256", self.source_url)
    }

    /// Returns the URL of the detached signature sidecar.
    #[must_use]
    pub fn signature_url(&self) -> String {
        format!("{}.sig", self.source_url)
    }

    /// Returns the URL of the armored signing key for this release line.
    #[must_use]
    pub fn public_key_url(&self) -> &str {
        &self.key_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("linux", Some("ubuntu2004"), "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-ubuntu2004-5.0.2.tgz")]
    #[case("linux", Some("debian92"), "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-debian92-5.0.2.tgz")]
    #[case("macos", None, "https://fastdl.mongodb.org/osx/mongodb-macos-x86_64-5.0.2.tgz")]
    fn builds_vendor_urls(
        #[case] platform: &str,
        #[case] distro: Option<&str>,
        #[case] expected: &str,
    ) {
        let spec = VersionSpec::from_parts("5.0.2", platform, "x86_64", distro).expect("spec");
        assert_eq!(build_download_url(DEFAULT_DOWNLOAD_BASE, &spec), expected);
    }

    #[test]
    fn trailing_slash_on_mirror_is_ignored() {
        let spec = VersionSpec::from_parts("4.4.6", "macos", "x86_64", None).expect("spec");
        assert_eq!(
            build_download_url("http://mirror.local/", &spec),
            "http://mirror.local/osx/mongodb-macos-x86_64-4.4.6.tgz"
        );
    }

    #[test]
    fn sidecar_and_key_urls_derive_from_the_archive() {
        let spec =
            VersionSpec::from_parts("6.0.3", "linux", "x86_64", Some("debian10")).expect("spec");
        let config = ProvisionConfig::new(spec, &DownloadSources::default(), Utf8Path::new("/c"))
            .expect("config");
        assert_eq!(
            config.checksum_url(),
            format!("{}.sha256", config.source_url())
        );
        assert_eq!(config.signature_url(), format!("{}.sig", config.source_url()));
        assert_eq!(
            config.public_key_url(),
            "https://www.mongodb.org/static/pgp/server-6.0.asc"
        );
        assert_eq!(
            config.cache_path().as_str(),
            "/c/mongo-in-memory/mongodb-linux-x86_64-debian10-6.0.3.tgz/mongod"
        );
    }
}
