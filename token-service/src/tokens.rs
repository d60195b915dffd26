use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common_auth::{AuthError, AuthResult, ClaimSet, ClaimsCodec, RefreshLedger, TokenKind};
use tracing::{debug, warn};

use crate::credentials::Principal;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
    pub token_type: &'static str,
}

#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access: AccessToken,
    pub refresh: RefreshToken,
}

/// Mints access and refresh tokens and keeps the refresh ledger in step.
pub struct TokenIssuer {
    codec: Arc<ClaimsCodec>,
    ledger: Arc<dyn RefreshLedger>,
    config: TokenConfig,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(
        codec: Arc<ClaimsCodec>,
        ledger: Arc<dyn RefreshLedger>,
        config: TokenConfig,
    ) -> AuthResult<Self> {
        let access_ttl = lifetime("access", config.access_ttl_seconds)?;
        let refresh_ttl = lifetime("refresh", config.refresh_ttl_seconds)?;

        Ok(Self {
            codec,
            ledger,
            config,
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Stateless access token; nothing is recorded server side.
    pub fn issue_access_token(
        &self,
        principal_id: &str,
        audience: Option<&str>,
        scope: Option<&str>,
    ) -> AuthResult<AccessToken> {
        let now = self.codec.now();
        let expires_at = expiry(now, self.access_ttl)?;
        let claims = ClaimSet::new(principal_id, TokenKind::Access, now, expires_at)?
            .with_audience(audience.map(str::to_owned))
            .with_scope(scope.map(str::to_owned));

        let token = self.codec.encode(&claims)?;
        debug!(principal_id, audience, "issued access token");

        Ok(AccessToken {
            token,
            expires_at: claims.expires_at,
            expires_in: claims.lifetime_seconds(),
            token_type: "bearer",
        })
    }

    /// Mint a refresh token and make it the only active one for the principal.
    pub async fn issue_refresh_token(&self, principal_id: &str) -> AuthResult<RefreshToken> {
        let refresh = self.mint_refresh(principal_id)?;
        self.ledger.store(principal_id, &refresh.token).await?;
        debug!(principal_id, "issued refresh token");
        Ok(refresh)
    }

    /// Login pair: access token carrying the principal's scope plus a recorded refresh token.
    pub async fn issue_session(&self, principal: &Principal) -> AuthResult<IssuedTokens> {
        let access = self.issue_access_token(&principal.id, None, principal.scope.as_deref())?;
        let refresh = self.issue_refresh_token(&principal.id).await?;
        Ok(IssuedTokens { access, refresh })
    }

    /// Exchange a verified refresh token for a new pair.
    ///
    /// The ledger swap is conditional on `presented` still being active, so of
    /// two concurrent rotations with the same token only one succeeds.
    pub async fn rotate_session(
        &self,
        principal: &Principal,
        presented: &str,
    ) -> AuthResult<IssuedTokens> {
        let refresh = self.mint_refresh(&principal.id)?;
        let swapped = self
            .ledger
            .replace_if_active(&principal.id, presented, &refresh.token)
            .await?;
        if !swapped {
            warn!(principal_id = %principal.id, "refresh token rotated concurrently; rejecting");
            return Err(AuthError::TokenSuperseded);
        }

        let access = self.issue_access_token(&principal.id, None, principal.scope.as_deref())?;
        debug!(principal_id = %principal.id, "rotated refresh token");
        Ok(IssuedTokens { access, refresh })
    }

    /// Forget the principal's refresh token; all outstanding ones stop working.
    pub async fn revoke_session(&self, principal_id: &str) -> AuthResult<bool> {
        let revoked = self.ledger.revoke(principal_id).await?;
        debug!(principal_id, revoked, "revoked refresh session");
        Ok(revoked)
    }

    fn mint_refresh(&self, principal_id: &str) -> AuthResult<RefreshToken> {
        let now = self.codec.now();
        let expires_at = expiry(now, self.refresh_ttl)?;
        let claims = ClaimSet::new(principal_id, TokenKind::Refresh, now, expires_at)?;
        let token = self.codec.encode(&claims)?;

        Ok(RefreshToken {
            token,
            expires_at: claims.expires_at,
            expires_in: claims.lifetime_seconds(),
        })
    }
}

fn lifetime(kind: &str, seconds: i64) -> AuthResult<Duration> {
    Duration::try_seconds(seconds)
        .filter(|ttl| *ttl > Duration::zero())
        .ok_or_else(|| {
            AuthError::Configuration(format!("{kind} token lifetime {seconds}s is out of range"))
        })
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> AuthResult<DateTime<Utc>> {
    now.checked_add_signed(ttl).ok_or_else(|| {
        AuthError::Configuration("token expiry exceeds the representable time range".to_string())
    })
}
