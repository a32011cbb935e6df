use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, Bson, Document};
use regex::RegexBuilder;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::store::remote::{RemoteStore, Source};
use crate::utils::error::{ForumError, Result};

/// In-process store used by the test suite and for offline development.
///
/// Keeps a live document set per collection plus an explicitly-warmed cache
/// snapshot, so tests can exercise the stale-but-fast path: `warm_cache`
/// freezes the current live state as the cache source, later mutations only
/// touch the live state, and a cache read hands back the frozen snapshot.
///
/// Failure injection mirrors the two interesting production failure modes:
/// `deny_writes` makes the next n mutations fail as authorization-denied
/// (expired credential), `fail_server_reads` makes the next n server-sourced
/// reads fail as network errors.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    live: HashMap<String, Vec<(String, Document)>>,
    cached: HashMap<String, Vec<(String, Document)>>,
    deny_writes: u32,
    fail_server_reads: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze the current live state of `collection` as its cache snapshot.
    pub fn warm_cache(&self, collection: &str) {
        let mut inner = self.inner.lock().unwrap();
        let snapshot = inner.live.get(collection).cloned().unwrap_or_default();
        inner.cached.insert(collection.to_string(), snapshot);
    }

    /// Make the next `n` mutating calls fail with `AuthorizationDenied`.
    pub fn deny_writes(&self, n: u32) {
        self.inner.lock().unwrap().deny_writes = n;
    }

    /// Make the next `n` server-sourced reads fail with `Network`.
    pub fn fail_server_reads(&self, n: u32) {
        self.inner.lock().unwrap().fail_server_reads = n;
    }

    /// Number of live documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .live
            .get(collection)
            .map_or(0, |docs| docs.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

fn check_write(inner: &mut Inner) -> Result<()> {
    if inner.deny_writes > 0 {
        inner.deny_writes -= 1;
        return Err(ForumError::AuthorizationDenied(
            "credential expired".to_string(),
        ));
    }
    Ok(())
}

fn check_server_read(inner: &mut Inner) -> Result<()> {
    if inner.fail_server_reads > 0 {
        inner.fail_server_reads -= 1;
        return Err(ForumError::Network("connection reset".to_string()));
    }
    Ok(())
}

fn not_found(collection: &str, id: &str) -> ForumError {
    ForumError::NotFound(format!("{}/{} does not exist", collection, id))
}

/// Match a document against the filter dialect the engine actually uses:
/// field equality, null (matching absent or null fields), `$or` over
/// sub-filters, and `$regex` with optional `$options: "i"`.
fn matches_filter(document: &Document, filter: &Document) -> bool {
    for (key, expected) in filter {
        if key == "$or" {
            let Some(alternatives) = expected.as_array() else {
                return false;
            };
            let any = alternatives.iter().any(|alt| {
                alt.as_document()
                    .map_or(false, |sub| matches_filter(document, sub))
            });
            if !any {
                return false;
            }
        } else if !value_matches(document.get(key), expected) {
            return false;
        }
    }
    true
}

fn value_matches(actual: Option<&Bson>, expected: &Bson) -> bool {
    match expected {
        Bson::Document(criteria) if criteria.contains_key("$regex") => {
            let Ok(pattern) = criteria.get_str("$regex") else {
                return false;
            };
            let case_insensitive = criteria
                .get_str("$options")
                .map_or(false, |options| options.contains('i'));
            let Some(Bson::String(value)) = actual else {
                return false;
            };
            RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .build()
                .map_or(false, |re| re.is_match(value))
        }
        Bson::Null => matches!(actual, None | Some(Bson::Null)),
        other => actual == Some(other),
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str, source: Source) -> Result<Document> {
        let mut inner = self.inner.lock().unwrap();

        let docs = match source {
            Source::Server => {
                check_server_read(&mut inner)?;
                inner.live.get(collection)
            }
            Source::Cache => inner.cached.get(collection),
        };

        docs.and_then(|docs| docs.iter().find(|(doc_id, _)| doc_id == id))
            .map(|(_, document)| document.clone())
            .ok_or_else(|| not_found(collection, id))
    }

    async fn list(
        &self,
        collection: &str,
        filter: Document,
        source: Source,
    ) -> Result<Vec<Document>> {
        let mut inner = self.inner.lock().unwrap();

        let docs = match source {
            Source::Server => {
                check_server_read(&mut inner)?;
                inner.live.get(collection)
            }
            Source::Cache => inner.cached.get(collection),
        };

        Ok(docs
            .map(|docs| {
                docs.iter()
                    .filter(|(_, document)| matches_filter(document, &filter))
                    .map(|(_, document)| document.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add(&self, collection: &str, mut document: Document) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        check_write(&mut inner)?;

        let id = match document.get("_id") {
            Some(Bson::ObjectId(object_id)) => object_id.to_hex(),
            _ => {
                let object_id = ObjectId::new();
                document.insert("_id", object_id);
                object_id.to_hex()
            }
        };

        inner
            .live
            .entry(collection.to_string())
            .or_default()
            .push((id.clone(), document));

        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        check_write(&mut inner)?;

        let document = inner
            .live
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|(doc_id, _)| doc_id == id))
            .map(|(_, document)| document)
            .ok_or_else(|| not_found(collection, id))?;

        for (key, value) in fields {
            document.insert(key, value);
        }

        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        check_write(&mut inner)?;

        let docs = inner
            .live
            .get_mut(collection)
            .ok_or_else(|| not_found(collection, id))?;

        let before = docs.len();
        docs.retain(|(doc_id, _)| doc_id != id);

        if docs.len() == before {
            return Err(not_found(collection, id));
        }

        Ok(())
    }

    async fn array_add(&self, collection: &str, id: &str, field: &str, value: Bson) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        check_write(&mut inner)?;

        let document = inner
            .live
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|(doc_id, _)| doc_id == id))
            .map(|(_, document)| document)
            .ok_or_else(|| not_found(collection, id))?;

        match document.get_mut(field) {
            Some(Bson::Array(items)) => {
                if !items.contains(&value) {
                    items.push(value);
                }
            }
            _ => {
                document.insert(field, Bson::Array(vec![value]));
            }
        }

        Ok(())
    }

    async fn array_remove(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Bson,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        check_write(&mut inner)?;

        let document = inner
            .live
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|(doc_id, _)| doc_id == id))
            .map(|(_, document)| document)
            .ok_or_else(|| not_found(collection, id))?;

        if let Some(Bson::Array(items)) = document.get_mut(field) {
            items.retain(|item| item != &value);
        }

        Ok(())
    }

    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        check_write(&mut inner)?;

        let document = inner
            .live
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|(doc_id, _)| doc_id == id))
            .map(|(_, document)| document)
            .ok_or_else(|| not_found(collection, id))?;

        let current = match document.get(field) {
            Some(Bson::Int64(n)) => *n,
            Some(Bson::Int32(n)) => i64::from(*n),
            _ => 0,
        };

        document.insert(field, Bson::Int64(current + delta));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn equality_and_null_matching() {
        let oid = ObjectId::new();
        let document = doc! { "post_id": oid, "parent_comment_id": Bson::Null };

        assert!(matches_filter(&document, &doc! { "post_id": oid }));
        assert!(matches_filter(
            &document,
            &doc! { "parent_comment_id": Bson::Null }
        ));
        // A missing field also matches null.
        assert!(matches_filter(&document, &doc! { "absent": Bson::Null }));
        assert!(!matches_filter(&document, &doc! { "post_id": ObjectId::new() }));
    }

    #[test]
    fn regex_or_matching() {
        let document = doc! { "title": "Feeding schedule help", "content": "My puppy" };
        let filter = doc! {
            "$or": [
                { "title": { "$regex": "schedule", "$options": "i" } },
                { "content": { "$regex": "schedule", "$options": "i" } },
            ]
        };
        assert!(matches_filter(&document, &filter));

        let miss = doc! {
            "$or": [
                { "title": { "$regex": "grooming", "$options": "i" } },
                { "content": { "$regex": "grooming", "$options": "i" } },
            ]
        };
        assert!(!matches_filter(&document, &miss));
    }

    #[tokio::test]
    async fn array_add_is_a_set_add() {
        let store = MemoryStore::new();
        let id = store.add("posts", doc! { "likes": [] }).await.unwrap();

        store
            .array_add("posts", &id, "likes", Bson::String("u1".into()))
            .await
            .unwrap();
        store
            .array_add("posts", &id, "likes", Bson::String("u1".into()))
            .await
            .unwrap();

        let document = store.get("posts", &id, Source::Server).await.unwrap();
        assert_eq!(document.get_array("likes").unwrap().len(), 1);

        store
            .array_remove("posts", &id, "likes", Bson::String("u1".into()))
            .await
            .unwrap();
        let document = store.get("posts", &id, Source::Server).await.unwrap();
        assert!(document.get_array("likes").unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_snapshot_is_frozen_at_warm_time() {
        let store = MemoryStore::new();
        let id = store.add("posts", doc! { "title": "a" }).await.unwrap();
        store.warm_cache("posts");

        store
            .update("posts", &id, doc! { "title": "b" })
            .await
            .unwrap();

        let cached = store
            .list("posts", doc! {}, Source::Cache)
            .await
            .unwrap();
        assert_eq!(cached[0].get_str("title").unwrap(), "a");

        let live = store
            .list("posts", doc! {}, Source::Server)
            .await
            .unwrap();
        assert_eq!(live[0].get_str("title").unwrap(), "b");
    }

    #[tokio::test]
    async fn increment_handles_missing_and_int32_fields() {
        let store = MemoryStore::new();
        let id = store.add("posts", doc! {}).await.unwrap();

        store.increment("posts", &id, "comment_count", 1).await.unwrap();
        store.increment("posts", &id, "comment_count", -1).await.unwrap();

        let document = store.get("posts", &id, Source::Server).await.unwrap();
        assert_eq!(document.get_i64("comment_count").unwrap(), 0);
    }
}
