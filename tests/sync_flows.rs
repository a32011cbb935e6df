mod common;

use std::sync::Arc;

use petclub_forum::forum::{Post, ReportTarget, POSTS};
use petclub_forum::store::MemoryStore;
use petclub_forum::sync::CancelToken;
use petclub_forum::ForumError;

use common::{all_snapshots, draft, seed_category, session};

#[tokio::test]
async fn warm_cache_browse_yields_stale_then_fresh() {
    let store = Arc::new(MemoryStore::new());
    let s = session(&store, "user-a", "Avery");
    let nutrition = seed_category(&store, "Nutrition", 1).await;

    s.forum
        .add_post(draft("Feeding schedule help", "Twelve chars", &nutrition))
        .await
        .unwrap();
    store.warm_cache(POSTS);

    // The second post lands after the cache snapshot was taken.
    s.forum
        .add_post(draft("Kibble brand advice", "Content long enough", &nutrition))
        .await
        .unwrap();

    let mut posts = s.forum.list_posts(CancelToken::new());
    let snapshots = all_snapshots(&mut posts).await;

    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].len(), 1);
    assert_eq!(snapshots[1].len(), 2);
}

#[tokio::test]
async fn server_failure_leaves_the_stale_snapshot_standing() {
    let store = Arc::new(MemoryStore::new());
    let s = session(&store, "user-a", "Avery");
    let nutrition = seed_category(&store, "Nutrition", 1).await;

    s.forum
        .add_post(draft("Feeding schedule help", "Twelve chars", &nutrition))
        .await
        .unwrap();
    store.warm_cache(POSTS);
    store.fail_server_reads(1);

    let mut posts = s.forum.list_posts(CancelToken::new());
    let snapshots = all_snapshots(&mut posts).await;

    // One stale snapshot, no error: the sequence just ends.
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].len(), 1);
}

#[tokio::test]
async fn server_failure_without_a_cache_surfaces_the_error() {
    let store = Arc::new(MemoryStore::new());
    let s = session(&store, "user-a", "Avery");
    let nutrition = seed_category(&store, "Nutrition", 1).await;

    s.forum
        .add_post(draft("Feeding schedule help", "Twelve chars", &nutrition))
        .await
        .unwrap();
    store.fail_server_reads(1);

    let mut posts = s.forum.list_posts(CancelToken::new());
    let outcome = posts.recv().await.unwrap();
    assert!(matches!(outcome, Err(ForumError::Network(_))));
    assert!(posts.recv().await.is_none());
}

#[tokio::test]
async fn cancelled_browse_emits_nothing() {
    let store = Arc::new(MemoryStore::new());
    let s = session(&store, "user-a", "Avery");
    let nutrition = seed_category(&store, "Nutrition", 1).await;

    s.forum
        .add_post(draft("Feeding schedule help", "Twelve chars", &nutrition))
        .await
        .unwrap();
    store.warm_cache(POSTS);

    let cancel = CancelToken::new();
    cancel.cancel();

    let mut posts = s.forum.list_posts(cancel);
    assert!(posts.recv().await.is_none());
}

#[tokio::test]
async fn expired_credential_is_refreshed_once_and_the_like_lands() {
    let store = Arc::new(MemoryStore::new());
    let s = session(&store, "user-a", "Avery");
    let nutrition = seed_category(&store, "Nutrition", 1).await;

    let post = s
        .forum
        .add_post(draft("Feeding schedule help", "Twelve chars", &nutrition))
        .await
        .unwrap();

    store.deny_writes(1);
    let state = s.forum.toggle_like(post.id).await.unwrap();
    assert_eq!(state, petclub_forum::LikeState::Liked);
    assert_eq!(s.credentials.refresh_count(), 1);

    let stored: Post = s.repo.fetch_one(POSTS, &post.id.to_hex()).await.unwrap();
    assert_eq!(stored.likes, vec!["user-a".to_string()]);
}

#[tokio::test]
async fn a_second_denial_surfaces_after_exactly_one_refresh() {
    let store = Arc::new(MemoryStore::new());
    let s = session(&store, "user-a", "Avery");
    let nutrition = seed_category(&store, "Nutrition", 1).await;

    let post = s
        .forum
        .add_post(draft("Feeding schedule help", "Twelve chars", &nutrition))
        .await
        .unwrap();

    store.deny_writes(2);
    let outcome = s.forum.report(ReportTarget::Post(post.id), "spam").await;
    assert!(matches!(outcome, Err(ForumError::AuthorizationDenied(_))));
    assert_eq!(s.credentials.refresh_count(), 1);
}

#[tokio::test]
async fn a_failed_refresh_surfaces_without_retrying_the_mutation() {
    let store = Arc::new(MemoryStore::new());
    let s = session(&store, "user-a", "Avery");
    let nutrition = seed_category(&store, "Nutrition", 1).await;

    let post = s
        .forum
        .add_post(draft("Feeding schedule help", "Twelve chars", &nutrition))
        .await
        .unwrap();

    store.deny_writes(1);
    s.credentials.fail_refreshes(true);

    let outcome = s.forum.toggle_like(post.id).await;
    assert!(matches!(outcome, Err(ForumError::AuthorizationDenied(_))));

    let stored: Post = s.repo.fetch_one(POSTS, &post.id.to_hex()).await.unwrap();
    assert!(stored.likes.is_empty());
}
