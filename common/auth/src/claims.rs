use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

/// Which flow a token belongs to. Carried on the wire as `typ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Application-focused representation of a signed claim set.
///
/// Timestamps are kept at whole-second precision so a decoded claim set
/// compares equal to the one that was encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimSet {
    pub subject: String,
    pub kind: TokenKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub audience: Option<String>,
    pub scope: Option<String>,
    pub token_id: Uuid,
}

impl ClaimSet {
    /// Build a claim set with a fresh token id.
    ///
    /// Fails when the subject is blank or `expires_at` is not after `issued_at`.
    pub fn new(
        subject: impl Into<String>,
        kind: TokenKind,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<Self> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(AuthError::InvalidClaim("sub", subject));
        }

        let issued_at = whole_seconds(issued_at)?;
        let expires_at = whole_seconds(expires_at)?;
        if expires_at <= issued_at {
            return Err(AuthError::InvalidClaim("exp", expires_at.timestamp().to_string()));
        }

        Ok(Self {
            subject,
            kind,
            issued_at,
            expires_at,
            audience: None,
            scope: None,
            token_id: Uuid::new_v4(),
        })
    }

    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }

    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Seconds between issuance and expiry.
    pub fn lifetime_seconds(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }
}

/// Wire form of [`ClaimSet`], the JSON payload inside the JWT.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ClaimsRepr {
    sub: String,
    iss: String,
    typ: TokenKind,
    iat: i64,
    exp: i64,
    jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

impl ClaimsRepr {
    pub(crate) fn new(claims: &ClaimSet, issuer: &str) -> Self {
        Self {
            sub: claims.subject.clone(),
            iss: issuer.to_owned(),
            typ: claims.kind,
            iat: claims.issued_at.timestamp(),
            exp: claims.expires_at.timestamp(),
            jti: claims.token_id.to_string(),
            aud: claims.audience.clone(),
            scope: claims.scope.clone(),
        }
    }
}

impl TryFrom<ClaimsRepr> for ClaimSet {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        if value.sub.trim().is_empty() {
            return Err(AuthError::InvalidClaim("sub", value.sub));
        }

        let issued_at = DateTime::from_timestamp(value.iat, 0)
            .ok_or_else(|| AuthError::InvalidClaim("iat", value.iat.to_string()))?;
        let expires_at = DateTime::from_timestamp(value.exp, 0)
            .ok_or_else(|| AuthError::InvalidClaim("exp", value.exp.to_string()))?;
        if expires_at <= issued_at {
            return Err(AuthError::InvalidClaim("exp", value.exp.to_string()));
        }

        let token_id = Uuid::parse_str(&value.jti)
            .map_err(|_| AuthError::InvalidClaim("jti", value.jti.clone()))?;

        Ok(Self {
            subject: value.sub,
            kind: value.typ,
            issued_at,
            expires_at,
            audience: value.aud,
            scope: value.scope,
            token_id,
        })
    }
}

fn whole_seconds(instant: DateTime<Utc>) -> AuthResult<DateTime<Utc>> {
    DateTime::from_timestamp(instant.timestamp(), 0)
        .ok_or_else(|| AuthError::InvalidClaim("iat", instant.to_rfc3339()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    #[test]
    fn new_truncates_to_whole_seconds() {
        let issued = at(1_000) + Duration::milliseconds(750);
        let claims = ClaimSet::new("svc-a", TokenKind::Access, issued, at(1_300)).unwrap();
        assert_eq!(claims.issued_at, at(1_000));
        assert_eq!(claims.lifetime_seconds(), 300);
    }

    #[test]
    fn new_rejects_non_positive_lifetime() {
        let err = ClaimSet::new("svc-a", TokenKind::Access, at(1_000), at(1_000)).unwrap_err();
        assert!(matches!(err, AuthError::InvalidClaim("exp", _)));
    }

    #[test]
    fn new_rejects_blank_subject() {
        let err = ClaimSet::new("  ", TokenKind::Refresh, at(0), at(10)).unwrap_err();
        assert!(matches!(err, AuthError::InvalidClaim("sub", _)));
    }

    #[test]
    fn token_ids_are_unique() {
        let first = ClaimSet::new("svc-a", TokenKind::Refresh, at(0), at(10)).unwrap();
        let second = ClaimSet::new("svc-a", TokenKind::Refresh, at(0), at(10)).unwrap();
        assert_ne!(first.token_id, second.token_id);
    }

    #[test]
    fn repr_omits_absent_optionals() {
        let claims = ClaimSet::new("svc-a", TokenKind::Access, at(0), at(60)).unwrap();
        let json = serde_json::to_value(ClaimsRepr::new(&claims, "issuer")).unwrap();
        assert_eq!(json["typ"], "access");
        assert_eq!(json["iss"], "issuer");
        assert!(json.get("aud").is_none());
        assert!(json.get("scope").is_none());
    }

    #[test]
    fn repr_rejects_malformed_jti() {
        let repr: ClaimsRepr = serde_json::from_value(serde_json::json!({
            "sub": "svc-a",
            "iss": "issuer",
            "typ": "refresh",
            "iat": 0,
            "exp": 10,
            "jti": "not-a-uuid"
        }))
        .unwrap();
        let err = ClaimSet::try_from(repr).unwrap_err();
        assert!(matches!(err, AuthError::InvalidClaim("jti", _)));
    }
}
