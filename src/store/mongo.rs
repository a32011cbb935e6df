use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::{debug, info};
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};

use crate::store::cache::RedisCache;
use crate::store::remote::{RemoteStore, Source};
use crate::utils::error::{ForumError, Result};

/// Production store adapter: MongoDB as the authoritative document store,
/// Redis as the local snapshot cache behind `Source::Cache` reads.
///
/// Server reads write through to the cache so the next cache-first read has
/// a fast snapshot to hand out.
pub struct MongoRemoteStore {
    db: Database,
    cache: RedisCache,
}

impl MongoRemoteStore {
    /// Connect using `MONGODB_URI`, `FORUM_DATABASE` and `REDIS_URL`
    /// environment variables (with local-development defaults).
    pub async fn connect() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mongodb_uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let db_name =
            std::env::var("FORUM_DATABASE").unwrap_or_else(|_| "petclub_forum".to_string());

        let mut client_options = ClientOptions::parse(&mongodb_uri)
            .await
            .map_err(map_store_err)?;
        client_options.app_name = Some("petclub-forum".to_string());

        let client = Client::with_options(client_options).map_err(map_store_err)?;

        // Ping the server to see if we can reach the cluster at all.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(map_store_err)?;

        let cache = RedisCache::init().await?;

        info!("Connected to MongoDB database {}", db_name);

        Ok(Self {
            db: client.database(&db_name),
            cache,
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

fn parse_id(id: &str) -> Result<ObjectId> {
    ObjectId::parse_str(id)
        .map_err(|_| ForumError::Validation(format!("Invalid document id: {}", id)))
}

/// Map driver failures onto the engine taxonomy. Permission failures from the
/// hosted cluster become `AuthorizationDenied` so the sync layer can run its
/// refresh-and-retry pass; everything else is a transient network failure.
fn map_store_err(err: mongodb::error::Error) -> ForumError {
    match err.kind.as_ref() {
        ErrorKind::Command(command) if command.code == 13 => {
            ForumError::AuthorizationDenied(command.message.clone())
        }
        ErrorKind::Authentication { message, .. } => {
            ForumError::AuthorizationDenied(message.clone())
        }
        _ => ForumError::Network(format!("Store request failed: {}", err)),
    }
}

fn list_key(collection: &str, filter: &Document) -> String {
    let filter_json = serde_json::to_string(filter).unwrap_or_else(|_| filter.to_string());
    format!("{}:{}", collection, filter_json)
}

fn doc_key(collection: &str, id: &str) -> String {
    format!("{}:doc:{}", collection, id)
}

#[async_trait]
impl RemoteStore for MongoRemoteStore {
    async fn get(&self, collection: &str, id: &str, source: Source) -> Result<Document> {
        let object_id = parse_id(id)?;

        if source == Source::Cache {
            return match self.cache.get_doc(&doc_key(collection, id)).await? {
                Some(document) => Ok(document),
                None => Err(ForumError::NotFound(format!(
                    "No cached copy of {}/{}",
                    collection, id
                ))),
            };
        }

        let document = self
            .collection(collection)
            .find_one(doc! { "_id": object_id })
            .await
            .map_err(map_store_err)?
            .ok_or_else(|| ForumError::NotFound(format!("{}/{} does not exist", collection, id)))?;

        self.cache.put_doc(&doc_key(collection, id), &document).await?;

        Ok(document)
    }

    async fn list(
        &self,
        collection: &str,
        filter: Document,
        source: Source,
    ) -> Result<Vec<Document>> {
        let key = list_key(collection, &filter);

        if source == Source::Cache {
            let cached = self.cache.get_list(&key).await?.unwrap_or_default();
            debug!("Cache read for {} returned {} documents", key, cached.len());
            return Ok(cached);
        }

        let cursor = self
            .collection(collection)
            .find(filter)
            .await
            .map_err(map_store_err)?;

        let documents: Vec<Document> = cursor.try_collect().await.map_err(map_store_err)?;

        self.cache.put_list(&key, &documents).await?;

        Ok(documents)
    }

    async fn add(&self, collection: &str, document: Document) -> Result<String> {
        let result = self
            .collection(collection)
            .insert_one(document)
            .await
            .map_err(map_store_err)?;

        match result.inserted_id {
            Bson::ObjectId(object_id) => Ok(object_id.to_hex()),
            other => Err(ForumError::Internal(format!(
                "Store returned a non-ObjectId insert id: {}",
                other
            ))),
        }
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<()> {
        let object_id = parse_id(id)?;

        let result = self
            .collection(collection)
            .update_one(doc! { "_id": object_id }, doc! { "$set": fields })
            .await
            .map_err(map_store_err)?;

        if result.matched_count == 0 {
            return Err(ForumError::NotFound(format!(
                "{}/{} does not exist",
                collection, id
            )));
        }

        self.cache.invalidate(&doc_key(collection, id)).await?;

        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let object_id = parse_id(id)?;

        let result = self
            .collection(collection)
            .delete_one(doc! { "_id": object_id })
            .await
            .map_err(map_store_err)?;

        if result.deleted_count == 0 {
            return Err(ForumError::NotFound(format!(
                "{}/{} does not exist",
                collection, id
            )));
        }

        self.cache.invalidate(&doc_key(collection, id)).await?;

        Ok(())
    }

    async fn array_add(&self, collection: &str, id: &str, field: &str, value: Bson) -> Result<()> {
        let object_id = parse_id(id)?;

        let mut entry = Document::new();
        entry.insert(field, value);

        let result = self
            .collection(collection)
            .update_one(doc! { "_id": object_id }, doc! { "$addToSet": entry })
            .await
            .map_err(map_store_err)?;

        if result.matched_count == 0 {
            return Err(ForumError::NotFound(format!(
                "{}/{} does not exist",
                collection, id
            )));
        }

        self.cache.invalidate(&doc_key(collection, id)).await?;

        Ok(())
    }

    async fn array_remove(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Bson,
    ) -> Result<()> {
        let object_id = parse_id(id)?;

        let mut entry = Document::new();
        entry.insert(field, value);

        let result = self
            .collection(collection)
            .update_one(doc! { "_id": object_id }, doc! { "$pull": entry })
            .await
            .map_err(map_store_err)?;

        if result.matched_count == 0 {
            return Err(ForumError::NotFound(format!(
                "{}/{} does not exist",
                collection, id
            )));
        }

        self.cache.invalidate(&doc_key(collection, id)).await?;

        Ok(())
    }

    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> Result<()> {
        let object_id = parse_id(id)?;

        let mut entry = Document::new();
        entry.insert(field, delta);

        let result = self
            .collection(collection)
            .update_one(doc! { "_id": object_id }, doc! { "$inc": entry })
            .await
            .map_err(map_store_err)?;

        if result.matched_count == 0 {
            return Err(ForumError::NotFound(format!(
                "{}/{} does not exist",
                collection, id
            )));
        }

        self.cache.invalidate(&doc_key(collection, id)).await?;

        Ok(())
    }
}
