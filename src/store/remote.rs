use async_trait::async_trait;
use mongodb::bson::{Bson, Document};

use crate::utils::error::Result;

/// Read-source hint for store reads.
///
/// `Cache` asks for whatever local snapshot exists (possibly stale, possibly
/// nothing); `Server` is authoritative and refreshes the cache on the way
/// through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Server,
}

/// A networked, authenticated document collection.
///
/// Documents are addressed by collection path plus document id (the hex form
/// of the store-assigned id). BSON `Document` is the interchange
/// representation; typed decoding happens in the sync layer.
///
/// `array_add` / `array_remove` are atomic set mutations (no duplicates on
/// add, all occurrences removed), and `increment` is the atomic counter
/// primitive. These exist so that likes, report lists and denormalized
/// counters never go through a client-computed full-document overwrite.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a single document. Returns `ForumError::NotFound` if no document
    /// with that id exists in the requested source.
    async fn get(&self, collection: &str, id: &str, source: Source) -> Result<Document>;

    /// List documents matching `filter`. A cache-sourced list may be stale or
    /// empty even when the server has matching documents.
    async fn list(&self, collection: &str, filter: Document, source: Source)
        -> Result<Vec<Document>>;

    /// Insert a document and return its id. A document without an `_id` field
    /// gets a store-assigned one.
    async fn add(&self, collection: &str, doc: Document) -> Result<String>;

    /// Set the given fields on an existing document.
    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<()>;

    /// Remove a document entirely.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Atomic set-add on an array field.
    async fn array_add(&self, collection: &str, id: &str, field: &str, value: Bson) -> Result<()>;

    /// Atomic set-remove on an array field.
    async fn array_remove(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Bson,
    ) -> Result<()>;

    /// Atomic counter increment (negative `delta` decrements).
    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> Result<()>;
}
