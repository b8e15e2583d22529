//! Redis caching layer
//!
//! JSON key/value cache over a pooled Redis connection. Payloads above a few
//! KiB are stored zlib-compressed; the reader detects the zlib header and
//! inflates transparently. The cache is best-effort throughout: callers
//! treat every error as a miss.

use anyhow::Context;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{Read, Write};
use tracing::{debug, info};

use crate::error::GatewayError;

/// Payloads at or above this size are compressed before storage.
const COMPRESSION_THRESHOLD: usize = 4 * 1024;

/// First byte of a zlib stream (RFC 1950, 32K window).
const ZLIB_MAGIC: u8 = 0x78;

/// Error types for cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Compression error: {0}")]
    Compression(String),
}

impl From<CacheError> for GatewayError {
    fn from(err: CacheError) -> Self {
        GatewayError::Transient(err.to_string())
    }
}

/// Compress a JSON payload when it crosses the size threshold.
fn encode_payload(json: Vec<u8>) -> Result<Vec<u8>, CacheError> {
    if json.len() < COMPRESSION_THRESHOLD {
        return Ok(json);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Compression(e.to_string()))
}

/// Inflate a stored payload if it carries the zlib header.
///
/// JSON always starts with a printable ASCII byte, so the 0x78 header byte
/// is unambiguous.
fn decode_payload(raw: Vec<u8>) -> Result<Vec<u8>, CacheError> {
    if raw.first() != Some(&ZLIB_MAGIC) {
        return Ok(raw);
    }

    let mut decoder = ZlibDecoder::new(raw.as_slice());
    let mut inflated = Vec::new();
    decoder
        .read_to_end(&mut inflated)
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    Ok(inflated)
}

/// Redis cache client with transparent compression
#[derive(Clone)]
pub struct CacheClient {
    manager: ConnectionManager,
}

impl CacheClient {
    /// Connect and verify the connection with a PING.
    pub async fn new(cache_url: &str) -> anyhow::Result<Self> {
        info!("Initializing Redis cache connection pool");

        let client = Client::open(cache_url).context("Failed to create Redis client")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("Failed to create Redis connection manager")?;

        let mut conn = manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .context("Redis ping failed")?;

        info!("Redis cache initialized successfully");
        Ok(Self { manager })
    }

    /// Get a JSON value. `Ok(None)` on miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let mut conn = self.manager.clone();
        let raw: Option<Vec<u8>> = conn.get(key).await?;

        match raw {
            Some(bytes) => {
                debug!(key = %key, "Cache hit");
                let json = decode_payload(bytes)?;
                Ok(Some(serde_json::from_slice(&json)?))
            }
            None => {
                debug!(key = %key, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Set a JSON value with a TTL in seconds.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_vec(value)?;
        let payload = encode_payload(json)?;

        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, payload, ttl_secs).await?;

        debug!(key = %key, ttl = %ttl_secs, "Cache set");
        Ok(())
    }

    /// Delete one key. Returns the number of keys removed (0 or 1).
    pub async fn delete(&self, key: &str) -> Result<u64, CacheError> {
        let mut conn = self.manager.clone();
        let count: u64 = conn.del(key).await?;
        Ok(count)
    }

    /// Delete all keys matching a Redis glob pattern.
    pub async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let count: u64 = conn.del(&keys).await?;
        info!(pattern = %pattern, deleted = %count, "Deleted keys by pattern");
        Ok(count)
    }

    /// Connection liveness probe.
    pub async fn health_check(&self) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let response: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(response == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Payload {
        items: Vec<String>,
        count: usize,
    }

    #[test]
    fn test_small_payload_stays_plain() {
        let json = serde_json::to_vec(&Payload {
            items: vec!["a".into()],
            count: 1,
        })
        .unwrap();

        let encoded = encode_payload(json.clone()).unwrap();
        assert_eq!(encoded, json);
        assert_ne!(encoded.first(), Some(&ZLIB_MAGIC));
    }

    #[test]
    fn test_large_payload_round_trips_compressed() {
        let payload = Payload {
            items: vec!["overview text ".repeat(64); 50],
            count: 50,
        };
        let json = serde_json::to_vec(&payload).unwrap();
        assert!(json.len() >= COMPRESSION_THRESHOLD);

        let encoded = encode_payload(json.clone()).unwrap();
        assert_eq!(encoded.first(), Some(&ZLIB_MAGIC));
        assert!(encoded.len() < json.len());

        let decoded = decode_payload(encoded).unwrap();
        let restored: Payload = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn test_decode_passes_plain_json_through() {
        let json = b"{\"count\":1}".to_vec();
        assert_eq!(decode_payload(json.clone()).unwrap(), json);
    }

    #[tokio::test]
    async fn test_cache_lifecycle() {
        // Requires a running Redis instance
        let url =
            std::env::var("CACHE_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let cache = match CacheClient::new(&url).await {
            Ok(c) => c,
            Err(_) => {
                eprintln!("Skipping test: Redis not available");
                return;
            }
        };

        let value = Payload {
            items: vec!["item1".into(), "item2".into()],
            count: 2,
        };

        cache.set_json("test:core:lifecycle", &value, 60).await.unwrap();

        let cached: Option<Payload> = cache.get_json("test:core:lifecycle").await.unwrap();
        assert_eq!(cached, Some(value));

        let deleted = cache.delete("test:core:lifecycle").await.unwrap();
        assert_eq!(deleted, 1);

        let cached: Option<Payload> = cache.get_json("test:core:lifecycle").await.unwrap();
        assert_eq!(cached, None);
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let url =
            std::env::var("CACHE_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let cache = match CacheClient::new(&url).await {
            Ok(c) => c,
            Err(_) => {
                eprintln!("Skipping test: Redis not available");
                return;
            }
        };

        cache.set_json("test:pat:1", &1u32, 60).await.unwrap();
        cache.set_json("test:pat:2", &2u32, 60).await.unwrap();
        cache.set_json("test:other", &3u32, 60).await.unwrap();

        let deleted = cache.delete_by_pattern("test:pat:*").await.unwrap();
        assert_eq!(deleted, 2);

        let other: Option<u32> = cache.get_json("test:other").await.unwrap();
        assert_eq!(other, Some(3));

        cache.delete("test:other").await.unwrap();
    }
}
