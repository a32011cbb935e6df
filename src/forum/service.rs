use chrono::Utc;
use log::{debug, info};
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::forum::model::{Category, Comment, LikeState, NewPost, Post, ReportTarget};
use crate::forum::{CATEGORIES, COMMENTS, POSTS};
use crate::store::Source;
use crate::sync::{CancelToken, Snapshots, SyncRepository};
use crate::utils::error::{ForumError, Result};
use crate::utils::validation::{validate_comment_content, validate_new_post, validate_post_edit};

/// The forum engine: browse state, post and comment operations, like
/// toggling, reporting, and the lazily-populated reply cache.
///
/// All reads go through the cache-then-server observe path; all writes go
/// through the auth-retry mutation path. The engine itself keeps no document
/// state beyond the reply cache, and every snapshot a consumer receives is a
/// full replacement.
pub struct ForumService {
    repo: Arc<SyncRepository>,
    browse: Mutex<BrowseState>,
    reply_cache: Mutex<HashMap<ObjectId, Vec<Comment>>>,
}

#[derive(Default, Clone)]
struct BrowseState {
    category_id: Option<ObjectId>,
    search: Option<String>,
}

fn browse_filter(state: &BrowseState) -> Document {
    let mut filter = Document::new();
    if let Some(category_id) = state.category_id {
        filter.insert("category_id", category_id);
    }
    if let Some(query) = &state.search {
        let pattern = regex::escape(query);
        filter.insert(
            "$or",
            vec![
                doc! { "title": { "$regex": &pattern, "$options": "i" } },
                doc! { "content": { "$regex": &pattern, "$options": "i" } },
            ],
        );
    }
    filter
}

fn encode<T: Serialize>(value: &T) -> Result<Document> {
    bson::to_document(value)
        .map_err(|e| ForumError::Internal(format!("Failed to encode document: {}", e)))
}

fn now_bson() -> Result<Bson> {
    bson::to_bson(&Utc::now())
        .map_err(|e| ForumError::Internal(format!("Failed to encode timestamp: {}", e)))
}

impl ForumService {
    pub fn new(repo: Arc<SyncRepository>) -> Self {
        Self {
            repo,
            browse: Mutex::new(BrowseState::default()),
            reply_cache: Mutex::new(HashMap::new()),
        }
    }

    fn author(&self) -> Result<(String, String)> {
        let user_id = self.repo.acting_user()?;
        let name = self
            .repo
            .credentials()
            .display_name()
            .unwrap_or_else(|| user_id.clone());
        Ok((user_id, name))
    }

    // ============================================
    // Browsing
    // ============================================

    /// Category reference data, in display order.
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut categories: Vec<Category> = self.repo.fetch_list(CATEGORIES, doc! {}).await?;
        categories.sort_by_key(|category| category.sort_order);
        Ok(categories)
    }

    /// Select the active category. `None` means all categories. Selecting a
    /// category supersedes any active search.
    pub fn select_category(&self, category_id: Option<ObjectId>) {
        let mut browse = self.browse.lock().unwrap();
        browse.category_id = category_id;
        browse.search = None;
    }

    pub fn selected_category(&self) -> Option<ObjectId> {
        self.browse.lock().unwrap().category_id
    }

    /// Posts under the current browse state, as a cache-then-server sequence.
    pub fn list_posts(&self, cancel: CancelToken) -> Snapshots<Post> {
        let filter = browse_filter(&self.browse.lock().unwrap());
        self.repo.observe(POSTS, filter, cancel)
    }

    /// Server-side substring search over title and content, intersected with
    /// the selected category. Supersedes category-only listing until
    /// [`ForumService::clear_search`].
    pub fn search_posts(&self, query: &str, cancel: CancelToken) -> Result<Snapshots<Post>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ForumError::Validation(
                "search query cannot be empty".to_string(),
            ));
        }

        let filter = {
            let mut browse = self.browse.lock().unwrap();
            browse.search = Some(query.to_string());
            browse_filter(&browse)
        };

        Ok(self.repo.observe(POSTS, filter, cancel))
    }

    /// Drop the active search and restore the previously selected category
    /// filter exactly.
    pub fn clear_search(&self, cancel: CancelToken) -> Snapshots<Post> {
        let filter = {
            let mut browse = self.browse.lock().unwrap();
            browse.search = None;
            browse_filter(&browse)
        };

        self.repo.observe(POSTS, filter, cancel)
    }

    // ============================================
    // Posts
    // ============================================

    pub async fn add_post(&self, draft: NewPost) -> Result<Post> {
        let category = draft
            .category
            .ok_or_else(|| ForumError::Validation("a category must be selected".to_string()))?;
        validate_new_post(&draft.title, &draft.content, Some(&category.id.to_hex()))?;

        let (author_id, author_name) = self.author()?;
        let now = Utc::now();
        let post = Post {
            id: ObjectId::new(),
            title: draft.title.trim().to_string(),
            content: draft.content.trim().to_string(),
            category_id: category.id,
            category_name: category.name,
            author_id,
            author_name,
            created_at: now,
            updated_at: now,
            likes: Vec::new(),
            comment_count: 0,
            reported_by: Vec::new(),
            report_reason: None,
        };

        let document = encode(&post)?;
        self.repo
            .mutate(|| {
                let document = document.clone();
                async move { self.repo.store().add(POSTS, document).await }
            })
            .await?;

        info!("Created post {} in {}", post.id.to_hex(), post.category_name);
        Ok(post)
    }

    /// Author-owned edit. Absent fields are left untouched.
    pub async fn update_post(
        &self,
        post_id: ObjectId,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<()> {
        validate_post_edit(title.as_deref(), content.as_deref())?;

        let user_id = self.repo.acting_user()?;
        let post: Post = self.repo.fetch_one(POSTS, &post_id.to_hex()).await?;
        if post.author_id != user_id {
            return Err(ForumError::AuthorizationDenied(
                "only the author can edit a post".to_string(),
            ));
        }

        let mut fields = doc! { "updated_at": now_bson()? };
        if let Some(title) = title {
            fields.insert("title", title.trim());
        }
        if let Some(content) = content {
            fields.insert("content", content.trim());
        }

        self.repo
            .mutate(|| {
                let fields = fields.clone();
                async move {
                    self.repo
                        .store()
                        .update(POSTS, &post_id.to_hex(), fields)
                        .await
                }
            })
            .await
    }

    /// Author-owned delete. Removes the post's comments as well.
    pub async fn delete_post(&self, post_id: ObjectId) -> Result<()> {
        let user_id = self.repo.acting_user()?;
        let post: Post = self.repo.fetch_one(POSTS, &post_id.to_hex()).await?;
        if post.author_id != user_id {
            return Err(ForumError::AuthorizationDenied(
                "only the author can delete a post".to_string(),
            ));
        }

        delete_post_cascade(&self.repo, post_id).await?;

        let mut reply_cache = self.reply_cache.lock().unwrap();
        reply_cache.retain(|_, replies| replies.first().map_or(true, |r| r.post_id != post_id));

        Ok(())
    }

    /// Toggle the acting user's like on a post.
    ///
    /// This is a read-modify-write against the authoritative store, not a
    /// local counter: concurrent togglers resolve last-write-wins at the
    /// store and consumers re-synchronize on the next snapshot.
    pub async fn toggle_like(&self, post_id: ObjectId) -> Result<LikeState> {
        let user_id = self.repo.acting_user()?;
        let post: Post = self.repo.fetch_one(POSTS, &post_id.to_hex()).await?;
        self.toggle_like_on(POSTS, &post_id.to_hex(), &post.likes, &user_id)
            .await
    }

    async fn toggle_like_on(
        &self,
        collection: &str,
        id: &str,
        likes: &[String],
        user_id: &str,
    ) -> Result<LikeState> {
        if likes.iter().any(|liker| liker == user_id) {
            self.repo
                .mutate(|| async move {
                    self.repo
                        .store()
                        .array_remove(collection, id, "likes", Bson::String(user_id.to_string()))
                        .await
                })
                .await?;
            Ok(LikeState::Unliked)
        } else {
            self.repo
                .mutate(|| async move {
                    self.repo
                        .store()
                        .array_add(collection, id, "likes", Bson::String(user_id.to_string()))
                        .await
                })
                .await?;
            Ok(LikeState::Liked)
        }
    }

    // ============================================
    // Comments and replies
    // ============================================

    /// Top-level comments for a post, as a cache-then-server sequence.
    pub fn list_comments(&self, post_id: ObjectId, cancel: CancelToken) -> Snapshots<Comment> {
        let filter = doc! { "post_id": post_id, "parent_comment_id": Bson::Null };
        self.repo.observe(COMMENTS, filter, cancel)
    }

    pub async fn add_comment(&self, post_id: ObjectId, content: &str) -> Result<Comment> {
        validate_comment_content(content)?;
        // The parent post must still exist; a vanished post surfaces NotFound.
        let _: Post = self.repo.fetch_one(POSTS, &post_id.to_hex()).await?;

        self.insert_comment(post_id, None, content).await
    }

    /// Reply to a top-level comment. The reply tree is two levels deep:
    /// replying to a reply is a validation failure, and the parent must be a
    /// comment under the given post.
    pub async fn add_reply(
        &self,
        post_id: ObjectId,
        parent_comment_id: ObjectId,
        content: &str,
    ) -> Result<Comment> {
        validate_comment_content(content)?;

        let parent: Comment = self
            .repo
            .fetch_one(COMMENTS, &parent_comment_id.to_hex())
            .await?;
        if parent.post_id != post_id {
            return Err(ForumError::Validation(
                "parent comment belongs to a different post".to_string(),
            ));
        }
        if parent.is_reply() {
            return Err(ForumError::Validation(
                "replies to replies are not allowed".to_string(),
            ));
        }

        let reply = self
            .insert_comment(post_id, Some(parent_comment_id), content)
            .await?;

        // A new reply under this parent makes the cached set stale.
        self.reply_cache.lock().unwrap().remove(&parent_comment_id);

        Ok(reply)
    }

    async fn insert_comment(
        &self,
        post_id: ObjectId,
        parent_comment_id: Option<ObjectId>,
        content: &str,
    ) -> Result<Comment> {
        let (author_id, author_name) = self.author()?;
        let now = Utc::now();
        let mut comment = Comment {
            id: None,
            post_id,
            author_id,
            author_name,
            content: content.trim().to_string(),
            created_at: now,
            updated_at: now,
            likes: Vec::new(),
            reported_by: Vec::new(),
            report_reason: None,
            parent_comment_id,
        };

        let document = encode(&comment)?;
        let inserted_id = self
            .repo
            .mutate(|| {
                let document = document.clone();
                async move { self.repo.store().add(COMMENTS, document).await }
            })
            .await?;

        comment.id = Some(ObjectId::parse_str(&inserted_id).map_err(|_| {
            ForumError::Internal(format!("Store returned a malformed id: {}", inserted_id))
        })?);

        // Denormalized counter maintenance: the count is corrected here at
        // write time and reconciled by the next listing read.
        self.repo
            .mutate(|| async move {
                self.repo
                    .store()
                    .increment(POSTS, &post_id.to_hex(), "comment_count", 1)
                    .await
            })
            .await?;

        Ok(comment)
    }

    /// Replies under a parent comment, lazily fetched and cached per parent.
    ///
    /// Repeated calls for the same parent reuse the cache until a new reply
    /// under that parent invalidates it. A cancelled call returns `Ok(None)`
    /// with nothing cached; cancellation is a normal termination path, not an
    /// error.
    pub async fn list_replies(
        &self,
        post_id: ObjectId,
        parent_comment_id: ObjectId,
        cancel: CancelToken,
    ) -> Result<Option<Vec<Comment>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        if let Some(replies) = self.reply_cache.lock().unwrap().get(&parent_comment_id) {
            debug!("Reply cache hit for {}", parent_comment_id.to_hex());
            return Ok(Some(replies.clone()));
        }

        let replies: Vec<Comment> = self
            .repo
            .fetch_list(
                COMMENTS,
                doc! { "post_id": post_id, "parent_comment_id": parent_comment_id },
            )
            .await?;

        if cancel.is_cancelled() {
            debug!(
                "Discarding reply fetch for collapsed thread {}",
                parent_comment_id.to_hex()
            );
            return Ok(None);
        }

        self.reply_cache
            .lock()
            .unwrap()
            .insert(parent_comment_id, replies.clone());

        Ok(Some(replies))
    }

    /// Toggle the acting user's like on a comment or reply under a post.
    pub async fn toggle_comment_like(
        &self,
        post_id: ObjectId,
        comment_id: ObjectId,
    ) -> Result<LikeState> {
        let user_id = self.repo.acting_user()?;
        let comment: Comment = self.repo.fetch_one(COMMENTS, &comment_id.to_hex()).await?;
        if comment.post_id != post_id {
            return Err(ForumError::NotFound(format!(
                "comment {} is not under post {}",
                comment_id.to_hex(),
                post_id.to_hex()
            )));
        }

        self.toggle_like_on(COMMENTS, &comment_id.to_hex(), &comment.likes, &user_id)
            .await
    }

    /// Author-owned comment edit.
    pub async fn update_comment(
        &self,
        post_id: ObjectId,
        comment_id: ObjectId,
        content: &str,
    ) -> Result<()> {
        validate_comment_content(content)?;

        let user_id = self.repo.acting_user()?;
        let comment: Comment = self.repo.fetch_one(COMMENTS, &comment_id.to_hex()).await?;
        if comment.post_id != post_id {
            return Err(ForumError::NotFound(format!(
                "comment {} is not under post {}",
                comment_id.to_hex(),
                post_id.to_hex()
            )));
        }
        if comment.author_id != user_id {
            return Err(ForumError::AuthorizationDenied(
                "only the author can edit a comment".to_string(),
            ));
        }

        let fields = doc! { "content": content.trim(), "updated_at": now_bson()? };
        self.repo
            .mutate(|| {
                let fields = fields.clone();
                async move {
                    self.repo
                        .store()
                        .update(COMMENTS, &comment_id.to_hex(), fields)
                        .await
                }
            })
            .await?;

        // Keep any cached copy of this reply fresh enough for redisplay.
        if let Some(parent_id) = comment.parent_comment_id {
            self.reply_cache.lock().unwrap().remove(&parent_id);
        }

        Ok(())
    }

    /// Author-owned comment delete. Deleting a top-level comment removes its
    /// replies too, and the post counter is decremented accordingly.
    pub async fn delete_comment(&self, post_id: ObjectId, comment_id: ObjectId) -> Result<()> {
        let user_id = self.repo.acting_user()?;
        let comment: Comment = self.repo.fetch_one(COMMENTS, &comment_id.to_hex()).await?;
        if comment.post_id != post_id {
            return Err(ForumError::NotFound(format!(
                "comment {} is not under post {}",
                comment_id.to_hex(),
                post_id.to_hex()
            )));
        }
        if comment.author_id != user_id {
            return Err(ForumError::AuthorizationDenied(
                "only the author can delete a comment".to_string(),
            ));
        }

        let removed = delete_comment_cascade(&self.repo, &comment).await?;

        let mut reply_cache = self.reply_cache.lock().unwrap();
        reply_cache.remove(&comment_id);
        if let Some(parent_id) = comment.parent_comment_id {
            reply_cache.remove(&parent_id);
        }
        drop(reply_cache);

        self.repo
            .mutate(|| async move {
                self.repo
                    .store()
                    .increment(POSTS, &post_id.to_hex(), "comment_count", -removed)
                    .await
            })
            .await
    }

    // ============================================
    // Reporting
    // ============================================

    /// Report a post or comment with a reason.
    ///
    /// Appending the acting user is a set-add; the reason always reflects the
    /// most recent reporter. Returns `AlreadyReported` when this user already
    /// reported the entity; that outcome is informational and callers may
    /// treat it as silent success.
    pub async fn report(&self, target: ReportTarget, reason: &str) -> Result<()> {
        let user_id = self.repo.acting_user()?;
        let id = target.id().to_hex();

        let document = self
            .repo
            .store()
            .get(target.collection(), &id, Source::Server)
            .await?;
        let already = document
            .get_array("reported_by")
            .map(|reporters| {
                reporters
                    .iter()
                    .any(|reporter| reporter.as_str() == Some(user_id.as_str()))
            })
            .unwrap_or(false);
        if already {
            return Err(ForumError::AlreadyReported);
        }

        self.repo
            .mutate(|| {
                let id = id.clone();
                let user_id = user_id.clone();
                let reason = reason.to_string();
                async move {
                    self.repo
                        .store()
                        .array_add(
                            target.collection(),
                            &id,
                            "reported_by",
                            Bson::String(user_id),
                        )
                        .await?;
                    self.repo
                        .store()
                        .update(target.collection(), &id, doc! { "report_reason": reason })
                        .await
                }
            })
            .await?;

        info!("Reported {}/{}", target.collection(), id);
        Ok(())
    }
}

/// Remove a post and everything under it.
pub(crate) async fn delete_post_cascade(repo: &SyncRepository, post_id: ObjectId) -> Result<()> {
    let comments: Vec<Comment> = repo
        .fetch_list(COMMENTS, doc! { "post_id": post_id })
        .await?;

    for comment in &comments {
        if let Some(comment_id) = comment.id {
            let id = comment_id.to_hex();
            match repo
                .mutate(|| {
                    let id = id.clone();
                    async move { repo.store().delete(COMMENTS, &id).await }
                })
                .await
            {
                Ok(()) | Err(ForumError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
    }

    repo.mutate(|| async move { repo.store().delete(POSTS, &post_id.to_hex()).await })
        .await?;

    info!(
        "Deleted post {} and {} comments",
        post_id.to_hex(),
        comments.len()
    );
    Ok(())
}

/// Remove a comment and, for a top-level comment, its replies. Returns the
/// number of documents removed (for counter maintenance).
pub(crate) async fn delete_comment_cascade(repo: &SyncRepository, comment: &Comment) -> Result<i64> {
    let comment_id = comment
        .id
        .ok_or_else(|| ForumError::Internal("comment has no id".to_string()))?;

    let mut removed: i64 = 0;

    if !comment.is_reply() {
        let replies: Vec<Comment> = repo
            .fetch_list(
                COMMENTS,
                doc! { "post_id": comment.post_id, "parent_comment_id": comment_id },
            )
            .await?;

        for reply in replies {
            if let Some(reply_id) = reply.id {
                let id = reply_id.to_hex();
                match repo
                    .mutate(|| {
                        let id = id.clone();
                        async move { repo.store().delete(COMMENTS, &id).await }
                    })
                    .await
                {
                    Ok(()) => removed += 1,
                    Err(ForumError::NotFound(_)) => {}
                    Err(err) => return Err(err),
                }
            }
        }
    }

    repo.mutate(|| async move { repo.store().delete(COMMENTS, &comment_id.to_hex()).await })
        .await?;
    removed += 1;

    Ok(removed)
}
