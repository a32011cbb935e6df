use log::info;
use mongodb::bson::{self, doc, Bson, Document};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::env;

use crate::utils::error::{ForumError, Result};

/// How long a cached snapshot stays valid. Stale-but-fast is the point; the
/// next server read overwrites the entry anyway.
const SNAPSHOT_TTL_SECONDS: u64 = 300;

/// Redis connection wrapper for the local snapshot cache.
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl RedisCache {
    /// Initialize the Redis connection from the `REDIS_URL` environment
    /// variable.
    pub async fn init() -> Result<Self> {
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let client = Client::open(redis_url)
            .map_err(|e| ForumError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ForumError::Network(format!("Failed to connect to Redis: {}", e)))?;

        info!("Connected to Redis snapshot cache");

        Ok(Self { connection })
    }

    /// Store a list snapshot for a collection + filter pair.
    ///
    /// Snapshots are kept as raw BSON so ObjectId and timestamp fields survive
    /// the round trip intact.
    pub async fn put_list(&self, key: &str, docs: &[Document]) -> Result<()> {
        let mut conn = self.connection.clone();
        let cache_key = format!("cache:{}", key);

        let items: Vec<Bson> = docs.iter().cloned().map(Bson::Document).collect();
        let bytes = bson::to_vec(&doc! { "items": items })
            .map_err(|e| ForumError::Internal(format!("Failed to encode snapshot: {}", e)))?;

        conn.set_ex::<_, _, ()>(&cache_key, bytes, SNAPSHOT_TTL_SECONDS)
            .await
            .map_err(|e| ForumError::Network(format!("Failed to store snapshot: {}", e)))?;

        Ok(())
    }

    /// Fetch a cached list snapshot, if one exists.
    pub async fn get_list(&self, key: &str) -> Result<Option<Vec<Document>>> {
        let mut conn = self.connection.clone();
        let cache_key = format!("cache:{}", key);

        let bytes: Option<Vec<u8>> = conn
            .get(&cache_key)
            .await
            .map_err(|e| ForumError::Network(format!("Failed to read snapshot: {}", e)))?;

        let Some(bytes) = bytes else {
            return Ok(None);
        };

        let wrapper: Document = bson::from_slice(&bytes)
            .map_err(|e| ForumError::Internal(format!("Failed to decode snapshot: {}", e)))?;

        let items = wrapper
            .get_array("items")
            .map_err(|e| ForumError::Internal(format!("Malformed snapshot: {}", e)))?
            .iter()
            .filter_map(|b| b.as_document().cloned())
            .collect();

        Ok(Some(items))
    }

    /// Store a single document snapshot.
    pub async fn put_doc(&self, key: &str, document: &Document) -> Result<()> {
        let mut conn = self.connection.clone();
        let cache_key = format!("cache:{}", key);

        let bytes = bson::to_vec(document)
            .map_err(|e| ForumError::Internal(format!("Failed to encode document: {}", e)))?;

        conn.set_ex::<_, _, ()>(&cache_key, bytes, SNAPSHOT_TTL_SECONDS)
            .await
            .map_err(|e| ForumError::Network(format!("Failed to store document: {}", e)))?;

        Ok(())
    }

    /// Fetch a cached document snapshot, if one exists.
    pub async fn get_doc(&self, key: &str) -> Result<Option<Document>> {
        let mut conn = self.connection.clone();
        let cache_key = format!("cache:{}", key);

        let bytes: Option<Vec<u8>> = conn
            .get(&cache_key)
            .await
            .map_err(|e| ForumError::Network(format!("Failed to read document: {}", e)))?;

        match bytes {
            Some(bytes) => {
                let document = bson::from_slice(&bytes).map_err(|e| {
                    ForumError::Internal(format!("Failed to decode document: {}", e))
                })?;
                Ok(Some(document))
            }
            None => Ok(None),
        }
    }

    /// Drop a cached entry (used when a deletion makes a snapshot misleading).
    pub async fn invalidate(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let cache_key = format!("cache:{}", key);

        conn.del::<_, ()>(&cache_key)
            .await
            .map_err(|e| ForumError::Network(format!("Failed to drop cache entry: {}", e)))?;

        Ok(())
    }
}
