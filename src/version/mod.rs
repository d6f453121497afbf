//! Resolves a requested `MongoDB` version and the host into a build descriptor.
//!
//! Resolution is pure: the host is described by a [`HostSystem`] and an
//! [`OsReleaseReader`], and every failure is a terminal [`ResolveError`].

use std::fmt;
use std::str::FromStr;

use crate::error::{ResolveError, ResolveResult};
use crate::platform::{HostSystem, OsReleaseReader};

/// Oldest release line with published structured-log builds.
const MIN_SUPPORTED: (u32, u32) = (4, 4);

/// Operating systems with published `mongod` archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Linux; always paired with a [`DistroTag`].
    Linux,
    /// macOS.
    Macos,
}

impl Platform {
    /// Returns the directory segment used on the download host.
    #[must_use]
    pub const fn url_segment(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "osx",
        }
    }

    /// Returns the platform name used inside archive file names.
    #[must_use]
    pub const fn archive_label(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
        }
    }

    fn from_host_os(os: &str) -> ResolveResult<Self> {
        match os {
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" => Ok(Self::Macos),
            other => Err(ResolveError::UnsupportedSystem(format!(
                "OS {other} not supported"
            ))),
        }
    }
}

impl FromStr for Platform {
    type Err = ResolveError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "linux" => Ok(Self::Linux),
            "macos" | "osx" => Ok(Self::Macos),
            other => Err(ResolveError::UnsupportedPlatform(other.to_owned())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.archive_label())
    }
}

/// CPU architectures with published `mongod` archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 64-bit x86.
    X86_64,
}

impl Arch {
    /// Returns the architecture name used inside archive file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
        }
    }
}

impl FromStr for Arch {
    type Err = ResolveError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "x86_64" | "amd64" => Ok(Self::X86_64),
            other => Err(ResolveError::UnsupportedSystem(format!(
                "architecture {other} not supported"
            ))),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Linux distribution builds published for each release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistroTag {
    /// Ubuntu 20.04 and later.
    Ubuntu2004,
    /// Ubuntu 18.04 up to 20.04.
    Ubuntu1804,
    /// Ubuntu 16.04 up to 18.04.
    Ubuntu1604,
    /// Debian 10 and later.
    Debian10,
    /// Debian 9.
    Debian92,
}

impl DistroTag {
    /// Returns the tag used inside archive file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ubuntu2004 => "ubuntu2004",
            Self::Ubuntu1804 => "ubuntu1804",
            Self::Ubuntu1604 => "ubuntu1604",
            Self::Debian10 => "debian10",
            Self::Debian92 => "debian92",
        }
    }

    /// Maps an `os-release` id and version onto the newest compatible build.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnsupportedSystem`] when the version has no
    /// leading integer, the distribution is unknown, or it is older than the
    /// oldest published build.
    pub fn from_os_release(id: &str, version_id: &str) -> ResolveResult<Self> {
        let major_raw = version_id.split('.').next().unwrap_or_default();
        let major: u32 = major_raw.parse().map_err(|_| {
            ResolveError::UnsupportedSystem(format!("invalid version number '{version_id}'"))
        })?;

        match id {
            "ubuntu" => match major {
                20.. => Ok(Self::Ubuntu2004),
                18..=19 => Ok(Self::Ubuntu1804),
                16..=17 => Ok(Self::Ubuntu1604),
                _ => Err(ResolveError::UnsupportedSystem(format!(
                    "invalid ubuntu version {major} (min 16)"
                ))),
            },
            "debian" => match major {
                10.. => Ok(Self::Debian10),
                9 => Ok(Self::Debian92),
                _ => Err(ResolveError::UnsupportedSystem(format!(
                    "invalid debian version {major} (min 9)"
                ))),
            },
            other => Err(ResolveError::UnsupportedSystem(format!(
                "invalid linux version '{other}'"
            ))),
        }
    }
}

impl FromStr for DistroTag {
    type Err = ResolveError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        [
            Self::Ubuntu2004,
            Self::Ubuntu1804,
            Self::Ubuntu1604,
            Self::Debian10,
            Self::Debian92,
        ]
        .into_iter()
        .find(|tag| tag.as_str() == raw)
        .ok_or_else(|| ResolveError::UnsupportedSystem(format!("unknown distribution tag '{raw}'")))
    }
}

impl fmt::Display for DistroTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved `mongod` build: version, platform, architecture, and distribution.
///
/// The distribution is present exactly when the platform is Linux.
///
/// # Examples
///
/// ```
/// use mongo_in_memory::VersionSpec;
///
/// let spec = VersionSpec::from_parts("5.0.2", "linux", "x86_64", Some("ubuntu2004"))?;
/// assert_eq!(spec.archive_name(), "linux-x86_64-ubuntu2004");
/// # Ok::<(), mongo_in_memory::ResolveError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSpec {
    major: u32,
    minor: u32,
    patch: u32,
    platform: Platform,
    arch: Arch,
    distro: Option<DistroTag>,
}

impl VersionSpec {
    /// Resolves `version` for the host described by `host` and `os_release`.
    ///
    /// The `os-release` lookup only happens on Linux.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::MalformedVersion`] or
    /// [`ResolveError::UnsupportedVersion`] for bad versions and
    /// [`ResolveError::UnsupportedSystem`] for hosts without a published build.
    pub fn resolve(
        version: &str,
        host: &dyn HostSystem,
        os_release: &dyn OsReleaseReader,
    ) -> ResolveResult<Self> {
        let (major, minor, patch) = parse_version(version)?;
        let platform = Platform::from_host_os(host.os())?;
        let arch = host.arch().parse::<Arch>()?;
        let distro = match platform {
            Platform::Macos => None,
            Platform::Linux => {
                let release = os_release.read().map_err(|reason| {
                    ResolveError::UnsupportedSystem(format!("could not read os-release: {reason}"))
                })?;
                Some(DistroTag::from_os_release(&release.id, &release.version_id)?)
            }
        };
        Ok(Self {
            major,
            minor,
            patch,
            platform,
            arch,
            distro,
        })
    }

    /// Builds a descriptor for an explicit target rather than the host.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] when any part is invalid, when Linux is
    /// requested without a distribution, or when macOS is requested with one.
    pub fn from_parts(
        version: &str,
        platform: &str,
        arch: &str,
        distro: Option<&str>,
    ) -> ResolveResult<Self> {
        let (major, minor, patch) = parse_version(version)?;
        let parsed_platform = platform.parse::<Platform>()?;
        let parsed_arch = arch.parse::<Arch>()?;
        let parsed_distro = distro.map(str::parse::<DistroTag>).transpose()?;
        match (parsed_platform, parsed_distro) {
            (Platform::Linux, None) => Err(ResolveError::UnsupportedSystem(
                "linux builds require a distribution tag".to_owned(),
            )),
            (Platform::Macos, Some(tag)) => Err(ResolveError::UnsupportedSystem(format!(
                "macos builds take no distribution tag (got {tag})"
            ))),
            (_, tag) => Ok(Self {
                major,
                minor,
                patch,
                platform: parsed_platform,
                arch: parsed_arch,
                distro: tag,
            }),
        }
    }

    /// Returns the major version.
    #[must_use]
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Returns the minor version.
    #[must_use]
    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// Returns the patch version.
    #[must_use]
    pub const fn patch(&self) -> u32 {
        self.patch
    }

    /// Returns the target platform.
    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// Returns the target architecture.
    #[must_use]
    pub const fn arch(&self) -> Arch {
        self.arch
    }

    /// Returns the Linux distribution build, `None` on macOS.
    #[must_use]
    pub const fn distro(&self) -> Option<DistroTag> {
        self.distro
    }

    /// Returns `major.minor.patch`.
    #[must_use]
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    /// Returns the platform part of the archive name, e.g. `linux-x86_64-debian10`.
    #[must_use]
    pub fn archive_name(&self) -> String {
        let base = format!("{}-{}", self.platform.archive_label(), self.arch);
        match self.distro {
            Some(tag) => format!("{base}-{tag}"),
            None => base,
        }
    }
}

fn parse_version(version: &str) -> ResolveResult<(u32, u32, u32)> {
    let malformed = |reason: String| ResolveError::MalformedVersion {
        version: version.to_owned(),
        reason,
    };

    let parts: Vec<&str> = version.split('.').collect();
    let [major_raw, minor_raw, patch_raw] = parts.as_slice() else {
        return Err(malformed(
            "MongoDB version number must be in the form x.y.z".to_owned(),
        ));
    };

    let component = |raw: &str, name: &str| {
        raw.parse::<u32>()
            .map_err(|_| malformed(format!("could not parse {name} version '{raw}'")))
    };
    let major = component(major_raw, "major")?;
    let minor = component(minor_raw, "minor")?;
    let patch = component(patch_raw, "patch")?;

    if (major, minor) < MIN_SUPPORTED {
        return Err(ResolveError::UnsupportedVersion {
            version: version.to_owned(),
        });
    }
    Ok((major, minor, patch))
}
