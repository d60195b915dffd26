use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown principal or wrong secret. The two cases are indistinguishable.
    #[error("invalid credentials")]
    InvalidSecret,
    #[error("invalid token")]
    InvalidToken,
    #[error("token audience mismatch")]
    AudienceMismatch,
    /// Refresh token is validly signed and unexpired but no longer the active one.
    #[error("refresh token superseded")]
    TokenSuperseded,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("refresh token missing")]
    MissingRefreshToken,
    #[error("insufficient scope")]
    InsufficientScope { required: Vec<String> },
    #[error("principal '{0}' is already registered")]
    DuplicatePrincipal(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("failed to hash credential: {0}")]
    Hashing(String),
    #[error("credential or ledger store failure: {0}")]
    Store(String),
}

impl AuthError {
    /// True for every outcome that must surface to callers as a plain 401.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidSecret
                | AuthError::InvalidToken
                | AuthError::AudienceMismatch
                | AuthError::TokenSuperseded
                | AuthError::MissingAuthorization
                | AuthError::InvalidAuthorization
                | AuthError::MissingRefreshToken
        )
    }

    /// Low-cardinality label used for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            AuthError::InvalidSecret => "invalid_credentials",
            AuthError::InvalidToken | AuthError::InvalidClaim(_, _) => "invalid_token",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::TokenSuperseded => "superseded",
            AuthError::MissingAuthorization
            | AuthError::InvalidAuthorization
            | AuthError::MissingRefreshToken => "missing_credentials",
            AuthError::InsufficientScope { .. } => "insufficient_scope",
            AuthError::DuplicatePrincipal(_) => "duplicate_principal",
            AuthError::Configuration(_)
            | AuthError::Signing(_)
            | AuthError::Hashing(_)
            | AuthError::Store(_) => "internal_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Superseded refresh tokens render exactly like any other bad token.
        let (status, code, message) = match &self {
            AuthError::InvalidSecret => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid credentials.".to_string(),
            ),
            AuthError::InvalidToken | AuthError::TokenSuperseded => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN",
                "Invalid token.".to_string(),
            ),
            AuthError::AudienceMismatch => (
                StatusCode::UNAUTHORIZED,
                "AUTH_AUDIENCE",
                "Token is not intended for this service.".to_string(),
            ),
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => {
                (StatusCode::UNAUTHORIZED, "AUTH_HEADER", self.to_string())
            }
            AuthError::MissingRefreshToken => {
                (StatusCode::UNAUTHORIZED, "AUTH_REFRESH", self.to_string())
            }
            AuthError::InsufficientScope { required } => (
                StatusCode::FORBIDDEN,
                "AUTH_SCOPE",
                if required.is_empty() {
                    "Insufficient scope".to_string()
                } else {
                    format!("Insufficient scope. Required one of: {}", required.join(", "))
                },
            ),
            AuthError::InvalidClaim(_, _) => {
                (StatusCode::BAD_REQUEST, "AUTH_CLAIMS", self.to_string())
            }
            AuthError::DuplicatePrincipal(_) => {
                (StatusCode::CONFLICT, "PRINCIPAL_EXISTS", self.to_string())
            }
            AuthError::Configuration(_)
            | AuthError::Signing(_)
            | AuthError::Hashing(_)
            | AuthError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERVER_ERROR",
                "Internal server error.".to_string(),
            ),
        };

        let body = ErrorBody { code, message };
        (status, Json(body)).into_response()
    }
}
