use axum::{
    extract::State,
    http::{
        header::{CONTENT_TYPE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use common_auth::{
    cookie_value, ensure_scope, AuthContext, AuthError, AuthResult, BearerToken, ORDER_SCOPES,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::RefreshCookieConfig;
use crate::metrics::TEXT_FORMAT;
use crate::tokens::{AccessToken, IssuedTokens};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ClientCredentialsRequest {
    pub client_id: String,
    pub client_secret: String,
    /// Falls back to the configured service audience.
    #[serde(default)]
    pub audience: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl From<AccessToken> for TokenResponse {
    fn from(access: AccessToken) -> Self {
        Self {
            access_token: access.token,
            token_type: access.token_type,
            expires_in: access.expires_in,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProtectedResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceOrdersResponse {
    pub service: String,
    pub caller: String,
    pub scope: Option<String>,
    pub message: &'static str,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.encode_text() {
        Ok(body) => ([(CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    let outcome = login_inner(&state, &payload).await;
    state.metrics.login_attempt(outcome_label(&outcome));

    let tokens = outcome?;
    info!(principal_id = %payload.username, "login succeeded");
    Ok(session_response(&state, tokens))
}

async fn login_inner(state: &AppState, payload: &LoginRequest) -> AuthResult<IssuedTokens> {
    let principal = state
        .credentials
        .authenticate(payload.username.trim(), &payload.password)
        .await?
        .ok_or_else(|| {
            warn!(principal_id = %payload.username, "login rejected");
            AuthError::InvalidSecret
        })?;

    let tokens = state.issuer.issue_session(&principal).await?;
    state.metrics.token_issued("access");
    state.metrics.token_issued("refresh");
    Ok(tokens)
}

pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    let outcome = refresh_inner(&state, &headers).await;
    state.metrics.refresh_attempt(outcome_label(&outcome));

    Ok(session_response(&state, outcome?))
}

async fn refresh_inner(state: &AppState, headers: &HeaderMap) -> AuthResult<IssuedTokens> {
    let presented =
        cookie_value(headers, &state.config.cookie.name).ok_or(AuthError::MissingRefreshToken)?;
    let subject = state.guard.verify_refresh(&presented).await?;

    // A principal removed since issuance cannot refresh.
    let principal = state
        .credentials
        .principal(&subject)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    let tokens = state.issuer.rotate_session(&principal, &presented).await?;
    state.metrics.token_issued("access");
    state.metrics.token_issued("refresh");
    Ok(tokens)
}

/// Always answers 204 and clears the cookie; revokes only when the cookie
/// still carries the active refresh token.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(presented) = cookie_value(&headers, &state.config.cookie.name) {
        match state.guard.verify_refresh(&presented).await {
            Ok(subject) => match state.issuer.revoke_session(&subject).await {
                Ok(_) => info!(principal_id = %subject, "logged out"),
                Err(err) => error!(error = %err, "failed to revoke refresh session"),
            },
            Err(err) => debug!(outcome = err.outcome(), "logout with unusable refresh token"),
        }
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    append_cookie(&mut response, clear_refresh_cookie(&state.config.cookie));
    response
}

pub async fn protected(auth: AuthContext) -> Json<ProtectedResponse> {
    Json(ProtectedResponse {
        message: format!("Hello, {}!", auth.principal_id()),
    })
}

/// Client-credentials grant for service-to-service calls. No refresh token.
pub async fn issue_service_token(
    State(state): State<AppState>,
    Json(payload): Json<ClientCredentialsRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let outcome = service_token_inner(&state, &payload).await;
    state.metrics.login_attempt(outcome_label(&outcome));
    Ok(Json(outcome?.into()))
}

async fn service_token_inner(
    state: &AppState,
    payload: &ClientCredentialsRequest,
) -> AuthResult<AccessToken> {
    let principal = state
        .credentials
        .authenticate(payload.client_id.trim(), &payload.client_secret)
        .await?
        .ok_or_else(|| {
            warn!(client_id = %payload.client_id, "client credentials rejected");
            AuthError::InvalidSecret
        })?;

    let audience = payload
        .audience
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(&state.config.service_audience);
    state.credentials.authorize_audience(&principal, audience)?;

    let access =
        state
            .issuer
            .issue_access_token(&principal.id, Some(audience), principal.scope.as_deref())?;
    state.metrics.token_issued("access");
    info!(client_id = %principal.id, audience, "issued service token");
    Ok(access)
}

/// Downstream-service endpoint: requires this service's audience and an order scope.
pub async fn service_orders(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<ServiceOrdersResponse>, AuthError> {
    let audience = state.config.service_audience.as_str();
    let access = state.guard.verify_access(&token, Some(audience))?;
    ensure_scope(&access, ORDER_SCOPES)?;

    Ok(Json(ServiceOrdersResponse {
        service: audience.to_string(),
        caller: access.principal_id,
        scope: access.scope,
        message: "Orders secure data",
    }))
}

fn session_response(state: &AppState, tokens: IssuedTokens) -> Response {
    let cookie = refresh_cookie(
        &state.config.cookie,
        &tokens.refresh.token,
        tokens.refresh.expires_in,
    );
    let mut response = Json(TokenResponse::from(tokens.access)).into_response();
    append_cookie(&mut response, cookie);
    response
}

fn outcome_label<T>(outcome: &AuthResult<T>) -> &'static str {
    match outcome {
        Ok(_) => "success",
        Err(err) => err.outcome(),
    }
}

fn append_cookie(response: &mut Response, cookie: String) {
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(err) => error!(error = %err, "refresh cookie is not a valid header value"),
    }
}

pub(crate) fn refresh_cookie(config: &RefreshCookieConfig, token: &str, max_age: i64) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}",
        config.name,
        token,
        config.same_site.as_str(),
        max_age
    );
    if let Some(domain) = &config.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    if config.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub(crate) fn clear_refresh_cookie(config: &RefreshCookieConfig) -> String {
    refresh_cookie(config, "", 0)
}
