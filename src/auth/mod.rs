//! Authentication collaborator contract.
//!
//! Account registration, login and token issuance live outside this crate.
//! The engine only needs to know who is acting and how to ask for a
//! credential refresh when the store reports an expired credential.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::utils::error::{ForumError, Result};

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Id of the signed-in user, or `None` when signed out.
    fn current_user_id(&self) -> Option<String>;

    /// Display name attached to new posts and comments.
    fn display_name(&self) -> Option<String>;

    /// Ask the authentication layer for a fresh credential. Called by the
    /// sync layer after an authorization-denied mutation, at most once per
    /// operation.
    async fn refresh_credential(&self) -> Result<()>;
}

/// Fixed-identity provider for tests and offline previews.
///
/// Tracks how many refreshes were requested, and can be switched to fail
/// refreshes to exercise the surfaced-after-retry path.
pub struct StaticCredentials {
    user_id: String,
    display_name: String,
    refreshes: AtomicU32,
    fail_refresh: AtomicBool,
}

impl StaticCredentials {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            refreshes: AtomicU32::new(0),
            fail_refresh: AtomicBool::new(false),
        }
    }

    /// Number of refreshes requested so far.
    pub fn refresh_count(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Make subsequent refresh requests fail.
    pub fn fail_refreshes(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    fn current_user_id(&self) -> Option<String> {
        Some(self.user_id.clone())
    }

    fn display_name(&self) -> Option<String> {
        Some(self.display_name.clone())
    }

    async fn refresh_credential(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ForumError::AuthorizationDenied(
                "credential refresh rejected".to_string(),
            ));
        }
        Ok(())
    }
}

/// Signed-out provider; every identity lookup fails and refreshes are
/// rejected.
#[derive(Default)]
pub struct SignedOut;

#[async_trait]
impl CredentialProvider for SignedOut {
    fn current_user_id(&self) -> Option<String> {
        None
    }

    fn display_name(&self) -> Option<String> {
        None
    }

    async fn refresh_credential(&self) -> Result<()> {
        Err(ForumError::AuthorizationDenied(
            "no signed-in user".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::sync::SyncRepository;
    use std::sync::Arc;

    #[tokio::test]
    async fn signed_out_sessions_cannot_act() {
        let repo = SyncRepository::new(Arc::new(MemoryStore::new()), Arc::new(SignedOut));
        assert!(matches!(
            repo.acting_user(),
            Err(ForumError::AuthorizationDenied(_))
        ));
        assert!(SignedOut.refresh_credential().await.is_err());
    }

    #[tokio::test]
    async fn refresh_counting_and_failure_switch() {
        let credentials = StaticCredentials::new("user-1", "Avery");
        assert_eq!(credentials.refresh_count(), 0);

        credentials.refresh_credential().await.unwrap();
        assert_eq!(credentials.refresh_count(), 1);

        credentials.fail_refreshes(true);
        assert!(credentials.refresh_credential().await.is_err());
        assert_eq!(credentials.refresh_count(), 2);
    }
}
