use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;
use common_auth::{AuthError, AuthResult};
use rand_core::{OsRng, RngCore};
use serde::Serialize;
use tracing::{debug, warn};

/// An authenticated identity, either a service account or a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: String,
    pub scope: Option<String>,
    /// When set, tokens for this principal may only target this audience.
    pub audience: Option<String>,
}

/// A principal together with its Argon2 PHC hash.
#[derive(Clone)]
pub struct StoredPrincipal {
    pub principal: Principal,
    pub password_hash: String,
}

impl fmt::Debug for StoredPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredPrincipal")
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

/// Backing store for registered principals.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn get(&self, principal_id: &str) -> AuthResult<Option<StoredPrincipal>>;

    /// Insert unless the id is already taken. Returns false when it was.
    async fn put(&self, principal: StoredPrincipal) -> AuthResult<bool>;
}

#[derive(Clone, Default)]
pub struct InMemoryPrincipalStore {
    inner: Arc<RwLock<HashMap<String, StoredPrincipal>>>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn get(&self, principal_id: &str) -> AuthResult<Option<StoredPrincipal>> {
        let guard = self.inner.read().expect("rwlock poisoned");
        Ok(guard.get(principal_id).cloned())
    }

    async fn put(&self, principal: StoredPrincipal) -> AuthResult<bool> {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        if guard.contains_key(&principal.principal.id) {
            return Ok(false);
        }
        guard.insert(principal.principal.id.clone(), principal);
        Ok(true)
    }
}

/// Verifies presented secrets against Argon2 hashes held in a [`PrincipalStore`].
pub struct CredentialStore {
    store: Arc<dyn PrincipalStore>,
    hasher: Argon2<'static>,
    /// Verified against on unknown principals so both failure paths cost the same.
    dummy_hash: String,
}

impl CredentialStore {
    /// Argon2id with the crate's default cost parameters.
    pub fn new(store: Arc<dyn PrincipalStore>) -> AuthResult<Self> {
        Self::with_params(store, Params::default())
    }

    pub fn with_params(store: Arc<dyn PrincipalStore>, params: Params) -> AuthResult<Self> {
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut filler = [0u8; 32];
        OsRng.fill_bytes(&mut filler);
        let dummy_hash = hash_with(&hasher, &filler)?;

        Ok(Self {
            store,
            hasher,
            dummy_hash,
        })
    }

    /// Hash and record a new principal. Plaintext is never stored.
    pub async fn register(
        &self,
        principal_id: &str,
        plaintext_secret: &str,
        scope: Option<&str>,
        audience: Option<&str>,
    ) -> AuthResult<Principal> {
        let principal_id = principal_id.trim();
        if principal_id.is_empty() {
            return Err(AuthError::Configuration(
                "principal id must not be empty".to_string(),
            ));
        }
        if plaintext_secret.is_empty() {
            return Err(AuthError::Configuration(format!(
                "secret for principal '{principal_id}' must not be empty"
            )));
        }

        let principal = Principal {
            id: principal_id.to_string(),
            scope: scope.map(str::to_owned),
            audience: audience.map(str::to_owned),
        };
        let password_hash = hash_with(&self.hasher, plaintext_secret.as_bytes())?;

        let inserted = self
            .store
            .put(StoredPrincipal {
                principal: principal.clone(),
                password_hash,
            })
            .await?;
        if !inserted {
            return Err(AuthError::DuplicatePrincipal(principal.id));
        }

        debug!(principal_id = %principal.id, "registered principal");
        Ok(principal)
    }

    /// `Some` only for a known principal presenting the right secret.
    ///
    /// Unknown principal and wrong secret both yield `None`; only a backend
    /// failure of the store is an error.
    pub async fn authenticate(
        &self,
        principal_id: &str,
        plaintext_secret: &str,
    ) -> AuthResult<Option<Principal>> {
        match self.store.get(principal_id).await? {
            Some(stored) => {
                if self.verify(plaintext_secret, &stored.password_hash) {
                    Ok(Some(stored.principal))
                } else {
                    debug!(principal_id, "secret did not match stored hash");
                    Ok(None)
                }
            }
            None => {
                let _ = self.verify(plaintext_secret, &self.dummy_hash);
                debug!(principal_id, "authentication attempted for unknown principal");
                Ok(None)
            }
        }
    }

    /// Look up a registered principal without checking a secret.
    pub async fn principal(&self, principal_id: &str) -> AuthResult<Option<Principal>> {
        Ok(self
            .store
            .get(principal_id)
            .await?
            .map(|stored| stored.principal))
    }

    /// Reject a token request for an audience the principal is not allowed to target.
    pub fn authorize_audience(&self, principal: &Principal, requested: &str) -> AuthResult<()> {
        match principal.audience.as_deref() {
            Some(allowed) if allowed != requested => {
                debug!(
                    principal_id = %principal.id,
                    allowed,
                    requested,
                    "audience not permitted for principal"
                );
                Err(AuthError::AudienceMismatch)
            }
            _ => Ok(()),
        }
    }

    fn verify(&self, plaintext_secret: &str, phc: &str) -> bool {
        match PasswordHash::new(phc) {
            Ok(parsed) => self
                .hasher
                .verify_password(plaintext_secret.as_bytes(), &parsed)
                .is_ok(),
            Err(err) => {
                warn!(error = %err, "stored credential hash is malformed");
                false
            }
        }
    }
}

fn hash_with(hasher: &Argon2<'static>, secret: &[u8]) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    hasher
        .hash_password(secret, &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hashing(err.to_string()))
}
