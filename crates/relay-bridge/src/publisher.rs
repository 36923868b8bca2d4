//! Stream publisher
//!
//! Appends client messages onto the shared stream with an approximate
//! length trim, so producers and the bridge see the same `from`/`to`/`data`
//! field names. The `Publish` trait is the seam the SEND_MESSAGE handler
//! depends on, so it can be exercised without a broker.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::StreamMaxlen;
use redis::AsyncCommands;
use tracing::debug;

use relay_core::config::BridgeConfig;

use crate::error::Result;

// ----------------------------------------------------------------------------
// Publish Seam
// ----------------------------------------------------------------------------

/// Capability to append one entry to the durable stream
#[async_trait]
pub trait Publish: Send + Sync {
    /// Append an entry; returns the log-assigned entry id
    async fn publish(&self, from: Option<&str>, to: &str, data: &str) -> Result<String>;
}

// ----------------------------------------------------------------------------
// Stream Publisher
// ----------------------------------------------------------------------------

/// Redis-backed publisher with approximate stream trimming
pub struct StreamPublisher {
    conn: MultiplexedConnection,
    stream: String,
    maxlen: usize,
}

impl StreamPublisher {
    /// Connect to the broker and probe liveness once
    pub async fn connect(redis_url: &str, config: &BridgeConfig) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;

        Ok(Self {
            conn,
            stream: config.stream.clone(),
            maxlen: config.publish_maxlen,
        })
    }
}

#[async_trait]
impl Publish for StreamPublisher {
    async fn publish(&self, from: Option<&str>, to: &str, data: &str) -> Result<String> {
        let mut fields: Vec<(&str, &str)> = Vec::with_capacity(3);
        if let Some(from) = from {
            fields.push(("from", from));
        }
        fields.push(("to", to));
        fields.push(("data", data));

        // The multiplexed connection is cheap to clone per call.
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd_maxlen(
                &self.stream,
                StreamMaxlen::Approx(self.maxlen),
                "*",
                &fields,
            )
            .await?;

        debug!(stream = %self.stream, entry = %id, "Published stream entry");
        Ok(id)
    }
}
