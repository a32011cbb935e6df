#![allow(dead_code)]

use mongodb::bson::{self, oid::ObjectId};
use std::collections::HashSet;
use std::sync::Arc;

use petclub_forum::auth::{CredentialProvider, StaticCredentials};
use petclub_forum::forum::{Category, ForumService, NewPost, CATEGORIES};
use petclub_forum::moderation::ModerationService;
use petclub_forum::store::{MemoryStore, RemoteStore};
use petclub_forum::sync::{Snapshots, SyncRepository};

pub struct Session {
    pub credentials: Arc<StaticCredentials>,
    pub repo: Arc<SyncRepository>,
    pub forum: ForumService,
}

/// Build a forum session for one acting user over a shared store.
pub fn session(store: &Arc<MemoryStore>, user_id: &str, name: &str) -> Session {
    let _ = env_logger::builder().is_test(true).try_init();

    let credentials = Arc::new(StaticCredentials::new(user_id, name));
    let repo = Arc::new(SyncRepository::new(
        Arc::clone(store) as Arc<dyn RemoteStore>,
        Arc::clone(&credentials) as Arc<dyn CredentialProvider>,
    ));
    let forum = ForumService::new(Arc::clone(&repo));

    Session {
        credentials,
        repo,
        forum,
    }
}

/// Moderation controller for the same session, with an allowlist predicate.
pub fn moderation(session: &Session, moderator_ids: &[&str]) -> ModerationService {
    let allowed: HashSet<String> = moderator_ids.iter().map(|id| id.to_string()).collect();
    ModerationService::new(
        Arc::clone(&session.repo),
        Arc::new(move |user_id: &str| allowed.contains(user_id)),
    )
}

/// A category the engine can attach posts to, seeded into the store so
/// `list_categories` sees it too.
pub async fn seed_category(store: &Arc<MemoryStore>, name: &str, sort_order: i32) -> Category {
    let category = Category {
        id: ObjectId::new(),
        name: name.to_string(),
        description: format!("{} discussions", name),
        sort_order,
    };
    store
        .add(CATEGORIES, bson::to_document(&category).unwrap())
        .await
        .unwrap();
    category
}

pub fn draft(title: &str, content: &str, category: &Category) -> NewPost {
    NewPost {
        title: title.to_string(),
        content: content.to_string(),
        category: Some(category.clone()),
    }
}

/// Drain a snapshot sequence and return the final (authoritative) snapshot.
pub async fn last_snapshot<T>(snapshots: &mut Snapshots<T>) -> Vec<T> {
    let mut last = None;
    while let Some(item) = snapshots.recv().await {
        last = Some(item.expect("snapshot sequence failed"));
    }
    last.expect("sequence emitted no snapshot")
}

/// Drain a snapshot sequence, returning every emitted snapshot.
pub async fn all_snapshots<T>(snapshots: &mut Snapshots<T>) -> Vec<Vec<T>> {
    let mut collected = Vec::new();
    while let Some(item) = snapshots.recv().await {
        collected.push(item.expect("snapshot sequence failed"));
    }
    collected
}
