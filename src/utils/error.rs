use thiserror::Error;

/// The error taxonomy for all forum and sync operations.
///
/// `AuthorizationDenied` is the only variant the sync layer retries (once,
/// after a credential refresh). `AlreadyReported` is informational: callers
/// may treat it as success in UI terms.
#[derive(Debug, Error)]
pub enum ForumError {
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already reported")]
    AlreadyReported,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForumError {
    /// True for the variant that triggers the one-shot credential refresh.
    pub fn is_authorization_denied(&self) -> bool {
        matches!(self, ForumError::AuthorizationDenied(..))
    }
}

pub type Result<T> = std::result::Result<T, ForumError>;
