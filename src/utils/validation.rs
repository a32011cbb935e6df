use crate::utils::error::{ForumError, Result};

/// Minimum title length for a new post, in characters.
pub const MIN_TITLE_CHARS: usize = 5;

/// Minimum content length for a new post, in characters.
pub const MIN_POST_CONTENT_CHARS: usize = 10;

/// Validate a new post before it is sent to the store.
///
/// These checks are purely local: a draft that fails here never produces a
/// store call.
pub fn validate_new_post(title: &str, content: &str, category_id: Option<&str>) -> Result<()> {
    if title.trim().chars().count() < MIN_TITLE_CHARS {
        return Err(ForumError::Validation(format!(
            "title must be at least {} characters long",
            MIN_TITLE_CHARS
        )));
    }

    if content.trim().chars().count() < MIN_POST_CONTENT_CHARS {
        return Err(ForumError::Validation(format!(
            "content must be at least {} characters long",
            MIN_POST_CONTENT_CHARS
        )));
    }

    if category_id.is_none() {
        return Err(ForumError::Validation(
            "a category must be selected".to_string(),
        ));
    }

    Ok(())
}

/// Validate an author edit. Absent fields keep their stored value and are not
/// checked.
pub fn validate_post_edit(title: Option<&str>, content: Option<&str>) -> Result<()> {
    if let Some(title) = title {
        if title.trim().chars().count() < MIN_TITLE_CHARS {
            return Err(ForumError::Validation(format!(
                "title must be at least {} characters long",
                MIN_TITLE_CHARS
            )));
        }
    }

    if let Some(content) = content {
        if content.trim().chars().count() < MIN_POST_CONTENT_CHARS {
            return Err(ForumError::Validation(format!(
                "content must be at least {} characters long",
                MIN_POST_CONTENT_CHARS
            )));
        }
    }

    Ok(())
}

/// Validate comment or reply content. Whitespace-only content counts as empty.
pub fn validate_comment_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(ForumError::Validation(
            "comment content cannot be empty".to_string(),
        ));
    }

    Ok(())
}
