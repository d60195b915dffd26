use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

use crate::claims::{ClaimSet, ClaimsRepr};
use crate::clock::{Clock, SystemClock};
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};

/// Signs claim sets into compact JWTs and verifies them back.
///
/// Expiration is checked against the injected [`Clock`] rather than the
/// library's wall-clock check, so "now" is always the caller's.
#[derive(Clone)]
pub struct ClaimsCodec {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl ClaimsCodec {
    pub fn new(config: JwtConfig) -> AuthResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: JwtConfig, clock: Arc<dyn Clock>) -> AuthResult<Self> {
        if config.secret.trim().is_empty() {
            return Err(AuthError::Configuration(
                "signing secret must not be empty".to_string(),
            ));
        }

        let mut validation = Validation::new(config.algorithm);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Current instant according to the codec's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn encode(&self, claims: &ClaimSet) -> AuthResult<String> {
        let repr = ClaimsRepr::new(claims, &self.config.issuer);
        encode(&Header::new(self.config.algorithm), &repr, &self.encoding_key)
            .map_err(|err| AuthError::Signing(err.to_string()))
    }

    /// Verify signature, issuer, expiration and, when given, audience.
    pub fn decode(&self, token: &str, expected_audience: Option<&str>) -> AuthResult<ClaimSet> {
        let data = decode::<ClaimsRepr>(token, &self.decoding_key, &self.validation).map_err(
            |err| {
                debug!(error = %err, "token failed verification");
                AuthError::InvalidToken
            },
        )?;

        let claims = ClaimSet::try_from(data.claims).map_err(|err| {
            debug!(error = %err, "token carried malformed claims");
            AuthError::InvalidToken
        })?;

        let now = self.clock.now().timestamp();
        let deadline = claims.expires_at.timestamp() + i64::from(self.config.leeway_seconds);
        if now >= deadline {
            debug!(subject = %claims.subject, kind = claims.kind.as_str(), "token expired");
            return Err(AuthError::InvalidToken);
        }

        if let Some(expected) = expected_audience {
            if claims.audience.as_deref() != Some(expected) {
                debug!(
                    subject = %claims.subject,
                    expected,
                    actual = claims.audience.as_deref().unwrap_or("<none>"),
                    "token audience mismatch"
                );
                return Err(AuthError::AudienceMismatch);
            }
        }

        Ok(claims)
    }
}
