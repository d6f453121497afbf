//! Shared tracing configuration for observability instrumentation.
//!
//! Centralises the log targets used by the crate so subscribers can filter
//! provisioning and supervision events without pulling in unrelated
//! application logs.

/// Target used by lifecycle spans and logs.
pub(crate) const LOG_TARGET: &str = "mongo_in_memory::observability";

/// Target used by fetch and verification logs.
pub(crate) const DOWNLOAD_LOG_TARGET: &str = "mongo_in_memory::download";

/// Target used by binary cache logs.
pub(crate) const CACHE_LOG_TARGET: &str = "mongo_in_memory::cache";

/// Target used for output forwarded from the managed `mongod` process.
pub(crate) const SERVER_LOG_TARGET: &str = "mongo_in_memory::server";
