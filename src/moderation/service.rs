use log::info;
use mongodb::bson::{doc, Bson};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::forum::model::{Comment, Post, ReportTarget};
use crate::forum::service::{delete_comment_cascade, delete_post_cascade};
use crate::forum::{COMMENTS, POSTS};
use crate::sync::{CancelToken, Snapshots, SyncRepository};
use crate::utils::error::{ForumError, Result};
use crate::utils::validation::{validate_comment_content, validate_post_edit};

/// Authorization predicate injected by the host application. Replaces the
/// source system's hardcoded admin-id allowlist.
pub type ModeratorPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Entities a moderation queue row can carry.
pub trait Reported {
    fn reported_by(&self) -> &[String];
}

impl Reported for Post {
    fn reported_by(&self) -> &[String] {
        &self.reported_by
    }
}

impl Reported for Comment {
    fn reported_by(&self) -> &[String] {
        &self.reported_by
    }
}

/// The moderation controller.
///
/// There is no server-side "is reported" index, so the queue is re-derived
/// from a full collection scan on every refresh, through the same
/// cache-then-server and auth-retry machinery as every other read and write.
/// Failures are fully recoverable: a failed operation just leaves the queue
/// stale until the next manual refresh.
pub struct ModerationService {
    repo: Arc<SyncRepository>,
    is_moderator: ModeratorPredicate,
}

impl ModerationService {
    pub fn new(repo: Arc<SyncRepository>, is_moderator: ModeratorPredicate) -> Self {
        Self { repo, is_moderator }
    }

    fn require_moderator(&self) -> Result<String> {
        let user_id = self.repo.acting_user()?;
        if !(self.is_moderator)(&user_id) {
            return Err(ForumError::AuthorizationDenied(format!(
                "{} is not a moderator",
                user_id
            )));
        }
        Ok(user_id)
    }

    /// Reported posts, newest snapshot wins.
    pub fn queue_posts(&self, cancel: CancelToken) -> Result<Snapshots<Post>> {
        self.require_moderator()?;
        let snapshots = self.repo.observe(POSTS, doc! {}, cancel.clone());
        Ok(reported_only(snapshots, cancel))
    }

    /// Reported comments and replies.
    pub fn queue_comments(&self, cancel: CancelToken) -> Result<Snapshots<Comment>> {
        self.require_moderator()?;
        let snapshots = self.repo.observe(COMMENTS, doc! {}, cancel.clone());
        Ok(reported_only(snapshots, cancel))
    }

    /// Clear an entity's report state: REPORTED → CLEAN. Idempotent when the
    /// entity is already clean; the entity stays readable and can be
    /// reported afresh afterwards.
    pub async fn approve(&self, target: ReportTarget) -> Result<()> {
        self.require_moderator()?;

        let id = target.id().to_hex();
        self.repo
            .mutate(|| {
                let id = id.clone();
                async move {
                    self.repo
                        .store()
                        .update(
                            target.collection(),
                            &id,
                            doc! { "reported_by": Bson::Array(Vec::new()), "report_reason": Bson::Null },
                        )
                        .await
                }
            })
            .await?;

        info!("Approved {}/{}", target.collection(), id);
        Ok(())
    }

    /// Resolve a report by removing the entity: REPORTED → DELETED.
    /// Irreversible; rejecting a post removes its comments too.
    pub async fn reject(&self, target: ReportTarget) -> Result<()> {
        self.require_moderator()?;
        self.remove(target).await?;
        info!("Rejected {}/{}", target.collection(), target.id().to_hex());
        Ok(())
    }

    /// Remove an entity outright, reported or not.
    pub async fn delete(&self, target: ReportTarget) -> Result<()> {
        self.require_moderator()?;
        self.remove(target).await?;
        info!("Deleted {}/{}", target.collection(), target.id().to_hex());
        Ok(())
    }

    /// Content-only edit, legal from CLEAN or REPORTED; the report state is
    /// untouched.
    pub async fn edit(&self, target: ReportTarget, new_content: &str) -> Result<()> {
        self.require_moderator()?;

        match target {
            ReportTarget::Post(_) => validate_post_edit(None, Some(new_content))?,
            ReportTarget::Comment(_) => validate_comment_content(new_content)?,
        }

        let id = target.id().to_hex();
        let content = new_content.trim().to_string();
        self.repo
            .mutate(|| {
                let id = id.clone();
                let content = content.clone();
                async move {
                    self.repo
                        .store()
                        .update(target.collection(), &id, doc! { "content": content })
                        .await
                }
            })
            .await
    }

    async fn remove(&self, target: ReportTarget) -> Result<()> {
        match target {
            ReportTarget::Post(post_id) => delete_post_cascade(&self.repo, post_id).await,
            ReportTarget::Comment(comment_id) => {
                let comment: Comment =
                    self.repo.fetch_one(COMMENTS, &comment_id.to_hex()).await?;
                let removed = delete_comment_cascade(&self.repo, &comment).await?;
                let post_hex = comment.post_id.to_hex();
                self.repo
                    .mutate(|| {
                        let post_hex = post_hex.clone();
                        async move {
                            self.repo
                                .store()
                                .increment(POSTS, &post_hex, "comment_count", -removed)
                                .await
                        }
                    })
                    .await
            }
        }
    }
}

/// Relay a snapshot sequence, keeping only entities with a non-empty
/// reporter list. Errors and termination pass through unchanged.
fn reported_only<T>(mut snapshots: Snapshots<T>, cancel: CancelToken) -> Snapshots<T>
where
    T: Reported + Send + 'static,
{
    let (tx, rx) = mpsc::channel(2);

    tokio::spawn(async move {
        while let Some(item) = snapshots.recv().await {
            if cancel.is_cancelled() {
                return;
            }
            let filtered = item.map(|entities| {
                entities
                    .into_iter()
                    .filter(|entity| !entity.reported_by().is_empty())
                    .collect()
            });
            if tx.send(filtered).await.is_err() {
                return;
            }
        }
    });

    rx
}
