use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;

use crate::forum::model::{Comment, Post};

/// UI-ready projection of engine snapshots.
///
/// Every applied snapshot is an authoritative replacement for its key, never
/// a delta, so a consumer stays correct no matter how independent snapshot
/// sequences interleave.
#[derive(Debug, Default)]
pub struct ViewState {
    posts: Vec<Post>,
    comments: Vec<Comment>,
    replies: HashMap<ObjectId, Vec<Comment>>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the post list.
    pub fn apply_posts(&mut self, snapshot: Vec<Post>) {
        self.posts = snapshot;
    }

    /// Replace the top-level comment list.
    pub fn apply_comments(&mut self, snapshot: Vec<Comment>) {
        self.comments = snapshot;
    }

    /// Replace the loaded reply set for one parent comment.
    pub fn apply_replies(&mut self, parent_comment_id: ObjectId, snapshot: Vec<Comment>) {
        self.replies.insert(parent_comment_id, snapshot);
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn replies(&self, parent_comment_id: &ObjectId) -> Option<&[Comment]> {
        self.replies.get(parent_comment_id).map(Vec::as_slice)
    }
}
