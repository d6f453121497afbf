//! Downloads, verifies, and caches the configured `mongod` build.
//!
//! The server is **not** started: the binary is left in the shared cache for
//! later use by [`MongoServer`](mongo_in_memory::MongoServer). Configuration is
//! provided via `MONGO_*` environment variables parsed by
//! [`OrthoConfig`](https://github.com/leynos/ortho-config). The binary exits
//! with status code `0` on success and `1` on error.

use tracing_subscriber::EnvFilter;

fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    mongo_in_memory::run().map_err(|err| color_eyre::eyre::eyre!(err))?;
    Ok(())
}
