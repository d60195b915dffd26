use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, header::COOKIE, request::Parts, HeaderMap, HeaderValue};

use crate::error::{AuthError, AuthResult};
use crate::guards::{AccessGuard, VerifiedAccess};

/// Raw bearer token from the `Authorization` header, not yet verified.
///
/// Handlers that verify against a route-specific audience take this and call
/// [`AccessGuard::verify_access`] themselves.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthorization)?;
        Ok(Self(parse_bearer(header_value)?))
    }
}

/// Verified access token claims, without an audience restriction.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub access: VerifiedAccess,
    pub token: String,
}

impl AuthContext {
    pub fn principal_id(&self) -> &str {
        &self.access.principal_id
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.access.has_scope(scope)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<AccessGuard>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let guard = Arc::<AccessGuard>::from_ref(state);
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let access = guard.verify_access(&token, None)?;
        Ok(Self { access, token })
    }
}

pub fn parse_bearer(value: &HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let (scheme, token) = raw
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthorization)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthorization);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}

/// Value of the named cookie from the `Cookie` header(s), if present and non-empty.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| key.trim() == name && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_owned())
}
