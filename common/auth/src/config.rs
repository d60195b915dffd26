use std::fmt;
use std::str::FromStr;

use jsonwebtoken::Algorithm;

use crate::error::{AuthError, AuthResult};

/// Secret shipped as the development fallback. Never valid outside development.
pub const PLACEHOLDER_SECRET: &str = "dev-secret-key";

/// Runtime configuration for JWT signing and verification.
#[derive(Clone)]
pub struct JwtConfig {
    /// Shared HMAC secret used to sign and verify every token.
    pub secret: String,
    /// HMAC algorithm (HS256, HS384 or HS512).
    pub algorithm: Algorithm,
    /// Issuer claim (iss) stamped on issued tokens and required on decode.
    pub issuer: String,
    /// Allowable clock skew in seconds when validating exp.
    pub leeway_seconds: u32,
}

impl JwtConfig {
    /// Construct config with HS256 and no leeway.
    pub fn new(secret: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: Algorithm::HS256,
            issuer: issuer.into(),
            leeway_seconds: 0,
        }
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    /// Select the signing algorithm by its identifier, e.g. `"HS512"`.
    pub fn with_algorithm(mut self, identifier: &str) -> AuthResult<Self> {
        self.algorithm = parse_algorithm(identifier)?;
        Ok(self)
    }

    /// True when the secret is empty or still the development placeholder.
    pub fn uses_placeholder_secret(&self) -> bool {
        let secret = self.secret.trim();
        secret.is_empty() || secret == PLACEHOLDER_SECRET
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

/// Parse an algorithm identifier, accepting only the HMAC family.
pub fn parse_algorithm(identifier: &str) -> AuthResult<Algorithm> {
    let trimmed = identifier.trim();
    let algorithm = Algorithm::from_str(&trimmed.to_ascii_uppercase()).map_err(|_| {
        AuthError::Configuration(format!("unknown signing algorithm '{trimmed}'"))
    })?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => Err(AuthError::Configuration(format!(
            "signing algorithm {other:?} is not a shared-secret algorithm"
        ))),
    }
}
