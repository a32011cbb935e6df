//! Forum synchronization and moderation engine for the PetClub app.
//!
//! The crate reconciles locally cached forum state with a remote,
//! eventually-consistent document store. Reads are cache-then-server (a fast,
//! possibly stale snapshot followed by the authoritative one), writes are
//! server-authoritative with a one-shot credential-refresh retry, and the
//! moderation workflow (report → review → approve/reject) never loses or
//! duplicates a report.
//!
//! Screens, navigation, photos, notifications and account flows live in the
//! host application; this crate exposes plain data and explicit command
//! methods.
//!
//! ```no_run
//! use std::sync::Arc;
//! use petclub_forum::auth::StaticCredentials;
//! use petclub_forum::forum::ForumService;
//! use petclub_forum::store::MongoRemoteStore;
//! use petclub_forum::sync::{CancelToken, SyncRepository};
//!
//! # async fn run() -> petclub_forum::utils::error::Result<()> {
//! let store = Arc::new(MongoRemoteStore::connect().await?);
//! let credentials = Arc::new(StaticCredentials::new("user-1", "Avery"));
//! let repo = Arc::new(SyncRepository::new(store, credentials));
//! let forum = ForumService::new(repo);
//!
//! let mut posts = forum.list_posts(CancelToken::new());
//! while let Some(snapshot) = posts.recv().await {
//!     // Each snapshot fully replaces the previous one.
//!     let _posts = snapshot?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod forum;
pub mod moderation;
pub mod store;
pub mod sync;
pub mod utils;

pub use auth::CredentialProvider;
pub use forum::{Category, Comment, ForumService, LikeState, NewPost, Post, ReportTarget, ViewState};
pub use moderation::{ModerationService, ModeratorPredicate};
pub use store::{MemoryStore, MongoRemoteStore, RemoteStore, Source};
pub use sync::{CancelToken, Snapshots, SyncRepository};
pub use utils::error::{ForumError, Result};
