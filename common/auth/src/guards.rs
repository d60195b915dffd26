use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::claims::TokenKind;
use crate::codec::ClaimsCodec;
use crate::error::{AuthError, AuthResult};
use crate::ledger::RefreshLedger;

/// Identity extracted from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedAccess {
    pub principal_id: String,
    pub scope: Option<String>,
    pub audience: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl VerifiedAccess {
    /// Scopes are space separated; matches any single entry.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope
            .as_deref()
            .is_some_and(|value| value.split_whitespace().any(|entry| entry == scope))
    }
}

/// Gate for protected operations: access tokens are stateless, refresh
/// tokens must additionally be the active entry in the ledger.
#[derive(Clone)]
pub struct AccessGuard {
    codec: Arc<ClaimsCodec>,
    ledger: Arc<dyn RefreshLedger>,
}

impl AccessGuard {
    pub fn new(codec: Arc<ClaimsCodec>, ledger: Arc<dyn RefreshLedger>) -> Self {
        Self { codec, ledger }
    }

    pub fn codec(&self) -> &ClaimsCodec {
        &self.codec
    }

    pub fn verify_access(
        &self,
        token: &str,
        expected_audience: Option<&str>,
    ) -> AuthResult<VerifiedAccess> {
        let claims = self.codec.decode(token, expected_audience)?;
        if claims.kind != TokenKind::Access {
            debug!(subject = %claims.subject, "refresh token presented as access token");
            return Err(AuthError::InvalidToken);
        }

        Ok(VerifiedAccess {
            principal_id: claims.subject,
            scope: claims.scope,
            audience: claims.audience,
            expires_at: claims.expires_at,
        })
    }

    /// Returns the subject of a refresh token that is valid and still active.
    pub async fn verify_refresh(&self, token: &str) -> AuthResult<String> {
        let claims = self.codec.decode(token, None)?;
        if claims.kind != TokenKind::Refresh {
            debug!(subject = %claims.subject, "access token presented as refresh token");
            return Err(AuthError::InvalidToken);
        }

        if !self.ledger.is_active(&claims.subject, token).await? {
            warn!(subject = %claims.subject, "rejected superseded refresh token");
            return Err(AuthError::TokenSuperseded);
        }

        Ok(claims.subject)
    }
}

/// Require at least one of `allowed` in the token's scope. Empty means any.
pub fn ensure_scope(access: &VerifiedAccess, allowed: &[&str]) -> AuthResult<()> {
    if allowed.is_empty() || allowed.iter().any(|scope| access.has_scope(scope)) {
        Ok(())
    } else {
        Err(AuthError::InsufficientScope {
            required: allowed.iter().map(|value| value.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ClaimSet;
    use crate::clock::ManualClock;
    use crate::config::JwtConfig;
    use crate::ledger::InMemoryRefreshLedger;
    use chrono::Duration;

    struct Fixture {
        codec: Arc<ClaimsCodec>,
        ledger: Arc<InMemoryRefreshLedger>,
        guard: AccessGuard,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::from_timestamp(1_700_000_000);
        let codec = Arc::new(
            ClaimsCodec::with_clock(JwtConfig::new("guard-secret", "guard-issuer"), Arc::new(clock))
                .unwrap(),
        );
        let ledger = Arc::new(InMemoryRefreshLedger::new());
        let guard = AccessGuard::new(codec.clone(), ledger.clone());
        Fixture {
            codec,
            ledger,
            guard,
        }
    }

    fn mint(codec: &ClaimsCodec, kind: TokenKind, scope: Option<&str>) -> String {
        let now = codec.now();
        let claims = ClaimSet::new("svc-a", kind, now, now + Duration::minutes(5))
            .unwrap()
            .with_scope(scope.map(str::to_owned));
        codec.encode(&claims).unwrap()
    }

    #[test]
    fn verify_access_extracts_identity_and_scope() {
        let f = fixture();
        let token = mint(&f.codec, TokenKind::Access, Some("orders:read"));
        let access = f.guard.verify_access(&token, None).unwrap();
        assert_eq!(access.principal_id, "svc-a");
        assert_eq!(access.scope.as_deref(), Some("orders:read"));
    }

    #[test]
    fn verify_access_rejects_refresh_tokens() {
        let f = fixture();
        let token = mint(&f.codec, TokenKind::Refresh, None);
        assert!(matches!(
            f.guard.verify_access(&token, None),
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn verify_refresh_requires_ledger_entry() {
        let f = fixture();
        let token = mint(&f.codec, TokenKind::Refresh, None);
        assert!(matches!(
            f.guard.verify_refresh(&token).await,
            Err(AuthError::TokenSuperseded)
        ));

        f.ledger.store("svc-a", &token).await.unwrap();
        assert_eq!(f.guard.verify_refresh(&token).await.unwrap(), "svc-a");
    }

    #[tokio::test]
    async fn verify_refresh_rejects_access_tokens() {
        let f = fixture();
        let token = mint(&f.codec, TokenKind::Access, None);
        f.ledger.store("svc-a", &token).await.unwrap();
        assert!(matches!(
            f.guard.verify_refresh(&token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn ensure_scope_matches_any_listed_scope() {
        let access = VerifiedAccess {
            principal_id: "svc-a".into(),
            scope: Some("orders:read profile".into()),
            audience: None,
            expires_at: Utc::now(),
        };
        assert!(ensure_scope(&access, &[]).is_ok());
        assert!(ensure_scope(&access, &["orders:write", "orders:read"]).is_ok());
        let err = ensure_scope(&access, &["orders:write"]).unwrap_err();
        match err {
            AuthError::InsufficientScope { required } => {
                assert_eq!(required, vec!["orders:write".to_string()])
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
