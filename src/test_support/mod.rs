//! Internal helpers re-exported for unit, integration, and doc tests.
//!
//! The fakes here stand in for every capability the provisioning and
//! supervision pipelines consult: the host description, the `os-release`
//! reader, the HTTP fetcher, the signature verifier, and the replica-set
//! client. Archive and fake-`mongod` builders let tests exercise the real
//! extractor and supervisor without network access or a MongoDB install.

mod archive;
mod fakes;
mod host;
#[cfg(any(test, feature = "log-capture"))]
mod logging;
#[cfg(unix)]
mod process;

pub use archive::{sha256_hex, tar_gz};
pub use fakes::{AcceptAllSignatures, RecordingFetcher, RecordingInitiator};
pub use host::{FakeHost, StaticOsRelease};
#[cfg(any(test, feature = "log-capture"))]
pub use logging::{capture_debug_logs, capture_warn_logs};
#[cfg(unix)]
pub use process::{FakeMongod, process_is_running, write_fake_mongod};
