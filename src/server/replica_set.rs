//! One-shot replica-set initiation for a freshly started server.

use std::fmt;

use async_trait::async_trait;
use color_eyre::eyre::Context;
use mongodb::Client;
use mongodb::bson::{Document, doc};

/// Issues `replSetInitiate` against a running server.
#[async_trait]
pub trait ReplicaSetInitiator: Send + Sync + fmt::Debug {
    /// Initiates `replica_set` with the server at `uri` as its only member,
    /// advertised as `localhost:<port>`.
    ///
    /// # Errors
    ///
    /// Returns an error when the server cannot be reached or rejects the
    /// command.
    async fn initiate(&self, uri: &str, replica_set: &str, port: u16) -> color_eyre::Result<()>;
}

/// Builds the single-member `replSetInitiate` command.
#[must_use]
pub fn initiate_command(replica_set: &str, port: u16) -> Document {
    doc! {
        "replSetInitiate": {
            "_id": replica_set,
            "members": [{ "_id": 0, "host": format!("localhost:{port}") }],
        }
    }
}

/// [`ReplicaSetInitiator`] backed by the official MongoDB driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverInitiator;

#[async_trait]
impl ReplicaSetInitiator for DriverInitiator {
    async fn initiate(&self, uri: &str, replica_set: &str, port: u16) -> color_eyre::Result<()> {
        // The member is not yet part of a set, so discovery must be skipped.
        let client = Client::with_uri_str(format!("{uri}/?directConnection=true"))
            .await
            .with_context(|| format!("connect to {uri}"))?;
        client
            .database("admin")
            .run_command(initiate_command(replica_set, port))
            .await
            .with_context(|| format!("replSetInitiate {replica_set}"))?;
        Ok(())
    }
}
