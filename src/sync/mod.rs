//! The reconciliation layer between cached and authoritative store state.
//!
//! Reads go cache-then-server: a warm cache yields a fast, possibly stale
//! snapshot immediately, then the server read yields the authoritative one.
//! Consumers must treat every snapshot as a full replacement, never a delta.
//!
//! Writes go through [`SyncRepository::mutate`], which wraps the operation in
//! the one-shot auth-retry policy: an authorization-denied failure triggers a
//! single credential refresh and a single retry before the failure surfaces.

use log::{debug, warn};
use mongodb::bson::{self, Document};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::auth::CredentialProvider;
use crate::store::{RemoteStore, Source};
use crate::utils::error::{ForumError, Result};

/// Cooperative cancellation handle for lifecycle-bound sequences.
///
/// Cancellation is a normal termination path: a cancelled sequence simply
/// stops emitting, and an in-flight read whose consumer is gone has its
/// result discarded silently.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A push-style sequence of list snapshots.
///
/// Each received item is either a full-replacement snapshot or the terminal
/// error of a sequence that produced no cache snapshot.
pub type Snapshots<T> = mpsc::Receiver<Result<Vec<T>>>;

pub struct SyncRepository {
    store: Arc<dyn RemoteStore>,
    credentials: Arc<dyn CredentialProvider>,
}

impl SyncRepository {
    pub fn new(store: Arc<dyn RemoteStore>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self { store, credentials }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialProvider> {
        &self.credentials
    }

    /// Id of the acting user, or `AuthorizationDenied` when signed out.
    pub fn acting_user(&self) -> Result<String> {
        self.credentials
            .current_user_id()
            .ok_or_else(|| ForumError::AuthorizationDenied("no signed-in user".to_string()))
    }

    /// Observe a collection as a cache-then-server snapshot sequence.
    ///
    /// Emission rules:
    /// 1. A non-empty cache read is emitted immediately.
    /// 2. The server read is emitted as the authoritative snapshot, even when
    ///    identical to the cache snapshot.
    /// 3. A failed server read ends the sequence silently if a cache snapshot
    ///    was already emitted; otherwise the failure is emitted.
    pub fn observe<T>(&self, collection: &str, filter: Document, cancel: CancelToken) -> Snapshots<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(2);
        let store = Arc::clone(&self.store);
        let collection = collection.to_string();

        tokio::spawn(async move {
            let mut cache_emitted = false;

            if cancel.is_cancelled() {
                return;
            }

            match store.list(&collection, filter.clone(), Source::Cache).await {
                Ok(documents) if !documents.is_empty() => {
                    match decode_all::<T>(documents) {
                        Ok(items) => {
                            if cancel.is_cancelled() {
                                return;
                            }
                            if tx.send(Ok(items)).await.is_err() {
                                return;
                            }
                            cache_emitted = true;
                        }
                        // An undecodable cache snapshot is treated like a
                        // cache miss; the server read still runs.
                        Err(err) => debug!("Discarding cache snapshot for {}: {}", collection, err),
                    }
                }
                Ok(_) => {}
                Err(err) => debug!("Cache read for {} failed: {}", collection, err),
            }

            if cancel.is_cancelled() {
                return;
            }

            match store.list(&collection, filter, Source::Server).await {
                Ok(documents) => {
                    let outcome = decode_all::<T>(documents);
                    if cancel.is_cancelled() {
                        return;
                    }
                    let _ = tx.send(outcome).await;
                }
                Err(err) => {
                    if cancel.is_cancelled() {
                        debug!("Discarding failed read for cancelled {} sequence", collection);
                        return;
                    }
                    if cache_emitted {
                        debug!(
                            "Server refresh for {} failed, cached snapshot stands: {}",
                            collection, err
                        );
                    } else {
                        let _ = tx.send(Err(err)).await;
                    }
                }
            }
        });

        rx
    }

    /// Authoritative single-document read.
    pub async fn fetch_one<T>(&self, collection: &str, id: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let document = self.store.get(collection, id, Source::Server).await?;
        decode(document)
    }

    /// Authoritative list read, no cache pass.
    pub async fn fetch_list<T>(&self, collection: &str, filter: Document) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let documents = self.store.list(collection, filter, Source::Server).await?;
        decode_all(documents)
    }

    /// Run a mutating operation under the auth-retry policy.
    ///
    /// On `AuthorizationDenied` the credential is refreshed once and the
    /// operation retried exactly once; every other failure surfaces as-is.
    /// The policy is stateless, so concurrent mutations do not interfere.
    pub async fn mutate<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match op().await {
            Err(ForumError::AuthorizationDenied(reason)) => {
                warn!("Mutation denied ({}), refreshing credential", reason);
                self.credentials.refresh_credential().await?;
                op().await
            }
            outcome => outcome,
        }
    }
}

fn decode<T: DeserializeOwned>(document: Document) -> Result<T> {
    bson::from_document(document)
        .map_err(|e| ForumError::Internal(format!("Failed to decode document: {}", e)))
}

fn decode_all<T: DeserializeOwned>(documents: Vec<Document>) -> Result<Vec<T>> {
    documents.into_iter().map(decode).collect()
}
