use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// A top-level forum submission. Belongs to exactly one category.
///
/// `comment_count` is a cached denormalization of the true comment count and
/// may transiently diverge after a comment mutation until the next reconciled
/// read.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub content: String,
    pub category_id: ObjectId,
    pub category_name: String,
    pub author_id: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// User ids that liked this post. Set semantics, order irrelevant.
    pub likes: Vec<String>,
    pub comment_count: i64,
    /// User ids that reported this post. Set semantics.
    pub reported_by: Vec<String>,
    /// Reason given by the most recent reporter. Not a history.
    pub report_reason: Option<String>,
}

/// A comment on a post, or (when `parent_comment_id` is set) a reply to a
/// top-level comment. The reply tree is exactly two levels deep: a reply can
/// never have replies of its own.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Comment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub post_id: ObjectId,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub likes: Vec<String>,
    /// User ids that reported this comment, in report order, no duplicates.
    pub reported_by: Vec<String>,
    pub report_reason: Option<String>,
    pub parent_comment_id: Option<ObjectId>,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_comment_id.is_some()
    }
}

/// Immutable reference data for filtering posts.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub description: String,
    pub sort_order: i32,
}

/// Draft for a new post. The category is mandatory; a draft without one is
/// rejected before any store call.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub category: Option<Category>,
}

/// Outcome of a like toggle, as seen by the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeState {
    Liked,
    Unliked,
}

/// Addressable entity for report and moderation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTarget {
    Post(ObjectId),
    Comment(ObjectId),
}

impl ReportTarget {
    pub fn collection(&self) -> &'static str {
        match self {
            ReportTarget::Post(_) => super::POSTS,
            ReportTarget::Comment(_) => super::COMMENTS,
        }
    }

    pub fn id(&self) -> ObjectId {
        match self {
            ReportTarget::Post(id) | ReportTarget::Comment(id) => *id,
        }
    }
}
