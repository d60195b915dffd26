use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::AuthResult;

/// Record of the single refresh token currently valid for each principal.
///
/// Implementations must linearize operations per principal: once `store` or
/// `replace_if_active` returns, every later `is_active` observes the new token.
#[async_trait]
pub trait RefreshLedger: Send + Sync {
    /// Unconditionally overwrite the active token for `principal_id`.
    async fn store(&self, principal_id: &str, token: &str) -> AuthResult<()>;

    /// True iff `token` is exactly the active token for `principal_id`.
    async fn is_active(&self, principal_id: &str, token: &str) -> AuthResult<bool>;

    /// Swap `current` for `next` only if `current` is still active.
    async fn replace_if_active(
        &self,
        principal_id: &str,
        current: &str,
        next: &str,
    ) -> AuthResult<bool>;

    /// Drop the active token. Returns whether one was present.
    async fn revoke(&self, principal_id: &str) -> AuthResult<bool>;
}

type TokenDigest = [u8; 32];

fn digest(token: &str) -> TokenDigest {
    Sha256::digest(token.as_bytes()).into()
}

/// Process-local ledger behind one lock. Holds token digests, never raw tokens.
#[derive(Clone, Default)]
pub struct InMemoryRefreshLedger {
    inner: Arc<RwLock<HashMap<String, TokenDigest>>>,
}

impl InMemoryRefreshLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().expect("rwlock poisoned");
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RefreshLedger for InMemoryRefreshLedger {
    async fn store(&self, principal_id: &str, token: &str) -> AuthResult<()> {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        guard.insert(principal_id.to_owned(), digest(token));
        Ok(())
    }

    async fn is_active(&self, principal_id: &str, token: &str) -> AuthResult<bool> {
        let guard = self.inner.read().expect("rwlock poisoned");
        Ok(guard
            .get(principal_id)
            .is_some_and(|active| *active == digest(token)))
    }

    async fn replace_if_active(
        &self,
        principal_id: &str,
        current: &str,
        next: &str,
    ) -> AuthResult<bool> {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        match guard.get_mut(principal_id) {
            Some(active) if *active == digest(current) => {
                *active = digest(next);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke(&self, principal_id: &str) -> AuthResult<bool> {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        Ok(guard.remove(principal_id).is_some())
    }
}
