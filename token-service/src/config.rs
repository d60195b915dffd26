use anyhow::{anyhow, bail, Context, Result};
use common_auth::{JwtConfig, PLACEHOLDER_SECRET};
use std::env;
use std::fmt;
use tracing::warn;

use crate::tokens::TokenConfig;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
const MAX_ACCESS_TTL_SECONDS: i64 = SECONDS_PER_DAY;
const MAX_REFRESH_TTL_DAYS: i64 = 365;
const MAX_REFRESH_TTL_SECONDS: i64 = MAX_REFRESH_TTL_DAYS * SECONDS_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Production,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Development => "development",
            Profile::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieSameSite {
    Lax,
    Strict,
    None,
}

impl CookieSameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            CookieSameSite::Lax => "Lax",
            CookieSameSite::Strict => "Strict",
            CookieSameSite::None => "None",
        }
    }
}

/// Attributes of the cookie carrying the refresh token.
#[derive(Debug, Clone)]
pub struct RefreshCookieConfig {
    pub name: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: CookieSameSite,
}

impl Default for RefreshCookieConfig {
    fn default() -> Self {
        Self {
            name: "refresh_token".to_string(),
            domain: None,
            secure: false,
            same_site: CookieSameSite::Lax,
        }
    }
}

/// A principal registered at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct PrincipalSeed {
    pub id: String,
    pub secret: String,
    pub scope: Option<String>,
    pub audience: Option<String>,
}

impl fmt::Debug for PrincipalSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrincipalSeed")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub profile: Profile,
    pub jwt: JwtConfig,
    pub tokens: TokenConfig,
    /// Audience this service requires on machine-to-machine calls.
    pub service_audience: String,
    pub principals: Vec<PrincipalSeed>,
    pub cookie: RefreshCookieConfig,
    pub host: String,
    pub port: u16,
}

impl ServiceConfig {
    /// Startup checks. A placeholder signing secret is fatal outside development.
    pub fn validate(&self) -> Result<()> {
        if self.profile == Profile::Production && self.jwt.uses_placeholder_secret() {
            bail!("JWT_SECRET must be set to a non-default value in the production profile");
        }
        if self.jwt.secret.trim().is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        if !(1..=MAX_ACCESS_TTL_SECONDS).contains(&self.tokens.access_ttl_seconds) {
            bail!("ACCESS_TOKEN_TTL_SECONDS must be between 1 and {MAX_ACCESS_TTL_SECONDS}");
        }
        if !(1..=MAX_REFRESH_TTL_SECONDS).contains(&self.tokens.refresh_ttl_seconds) {
            bail!("REFRESH_TOKEN_TTL_DAYS must be between 1 and {MAX_REFRESH_TTL_DAYS}");
        }
        if self.service_audience.trim().is_empty() {
            bail!("SERVICE_AUDIENCE must not be empty");
        }
        Ok(())
    }
}

pub fn load_service_config() -> Result<ServiceConfig> {
    load_service_config_from(|key| env::var(key).ok())
}

/// Build configuration from an arbitrary key lookup, then validate it.
pub fn load_service_config_from<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let profile = lookup("AUTH_PROFILE")
        .map(|value| parse_profile(&value))
        .transpose()
        .context("Failed to parse AUTH_PROFILE")?
        .unwrap_or(Profile::Development);

    let secret = match lookup("JWT_SECRET").and_then(|value| normalize_optional(&value)) {
        Some(secret) => secret,
        None => {
            if profile == Profile::Development {
                warn!("JWT_SECRET not set; falling back to the development placeholder secret");
            }
            PLACEHOLDER_SECRET.to_string()
        }
    };

    let issuer = lookup("JWT_ISSUER")
        .and_then(|value| normalize_optional(&value))
        .unwrap_or_else(|| "token-service".to_string());

    let leeway_seconds = parse_number::<u32>(&lookup, "JWT_LEEWAY_SECONDS")?.unwrap_or(0);

    let mut jwt = JwtConfig::new(secret, issuer).with_leeway(leeway_seconds);
    if let Some(algorithm) = lookup("JWT_ALGORITHM").and_then(|value| normalize_optional(&value)) {
        jwt = jwt
            .with_algorithm(&algorithm)
            .map_err(|err| anyhow!("Failed to parse JWT_ALGORITHM: {err}"))?;
    }

    let access_ttl_seconds =
        parse_number::<i64>(&lookup, "ACCESS_TOKEN_TTL_SECONDS")?.unwrap_or(5 * 60);
    let refresh_ttl_days = parse_number::<i64>(&lookup, "REFRESH_TOKEN_TTL_DAYS")?.unwrap_or(7);
    let refresh_ttl_seconds = refresh_ttl_days
        .checked_mul(SECONDS_PER_DAY)
        .ok_or_else(|| anyhow!("REFRESH_TOKEN_TTL_DAYS is out of range"))?;

    let service_audience = lookup("SERVICE_AUDIENCE")
        .and_then(|value| normalize_optional(&value))
        .unwrap_or_else(|| "service-b".to_string());

    let principals = match lookup("AUTH_PRINCIPALS") {
        Some(value) => parse_principals(&value).context("Failed to parse AUTH_PRINCIPALS")?,
        None if profile == Profile::Development => default_principals(),
        None => {
            warn!("AUTH_PRINCIPALS not set; no principals will be able to authenticate");
            Vec::new()
        }
    };

    let cookie_defaults = RefreshCookieConfig::default();
    let cookie = RefreshCookieConfig {
        name: lookup("AUTH_REFRESH_COOKIE_NAME")
            .and_then(|value| normalize_optional(&value))
            .unwrap_or(cookie_defaults.name),
        domain: lookup("AUTH_REFRESH_COOKIE_DOMAIN").and_then(|value| normalize_optional(&value)),
        secure: bool_from_lookup(&lookup, "AUTH_REFRESH_COOKIE_SECURE")
            .unwrap_or(profile == Profile::Production),
        same_site: lookup("AUTH_REFRESH_COOKIE_SAMESITE")
            .map(|value| parse_same_site(&value))
            .transpose()
            .context("Failed to parse AUTH_REFRESH_COOKIE_SAMESITE")?
            .unwrap_or(cookie_defaults.same_site),
    };

    let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
    let port = parse_number::<u16>(&lookup, "PORT")?.unwrap_or(8085);

    let config = ServiceConfig {
        profile,
        jwt,
        tokens: TokenConfig {
            access_ttl_seconds,
            refresh_ttl_seconds,
        },
        service_audience,
        principals,
        cookie,
        host,
        port,
    };
    config.validate()?;
    Ok(config)
}

/// Parse `id:secret[:scope][@audience]` entries separated by commas.
///
/// The scope is everything after the second colon, so `orders:read` survives
/// intact. The audience is taken from that trailing segment only; a secret may
/// contain `@`. Use `id:secret:@audience` for an audience without a scope.
pub fn parse_principals(value: &str) -> Result<Vec<PrincipalSeed>> {
    let mut principals: Vec<PrincipalSeed> = Vec::new();
    for item in value.split(',') {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut parts = trimmed.splitn(3, ':');
        let id = parts.next().map(str::trim).unwrap_or_default();
        let secret = parts.next().map(str::trim).unwrap_or_default();
        let (scope, audience) = match parts.next() {
            Some(rest) => match rest.rsplit_once('@') {
                Some((scope, audience)) => {
                    let audience = normalize_optional(audience);
                    if audience.is_none() {
                        bail!("Invalid principal entry '{id}': empty audience after '@'");
                    }
                    (normalize_optional(scope), audience)
                }
                None => (normalize_optional(rest), None),
            },
            None => (None, None),
        };

        if id.is_empty() || secret.is_empty() {
            bail!("Invalid principal entry '{id}': expected id:secret[:scope][@audience]");
        }
        if principals.iter().any(|existing| existing.id == id) {
            bail!("Duplicate principal '{id}'");
        }

        principals.push(PrincipalSeed {
            id: id.to_string(),
            secret: secret.to_string(),
            scope,
            audience,
        });
    }
    Ok(principals)
}

fn default_principals() -> Vec<PrincipalSeed> {
    vec![
        PrincipalSeed {
            id: "service-a".to_string(),
            secret: "secret-a".to_string(),
            scope: Some("orders:read".to_string()),
            audience: None,
        },
        PrincipalSeed {
            id: "service-b".to_string(),
            secret: "secret-b".to_string(),
            scope: Some("orders:write".to_string()),
            audience: None,
        },
    ]
}

fn parse_profile(value: &str) -> Result<Profile> {
    match value.trim().to_ascii_lowercase().as_str() {
        "dev" | "development" | "local" => Ok(Profile::Development),
        "prod" | "production" => Ok(Profile::Production),
        other => Err(anyhow!(
            "Unsupported profile '{other}'. Use development or production."
        )),
    }
}

fn parse_number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .and_then(|value| normalize_optional(&value))
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|err| anyhow!("Invalid {key} '{value}': {err}"))
        })
        .transpose()
}

fn bool_from_lookup(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    lookup(key).map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_same_site(value: &str) -> Result<CookieSameSite> {
    match value.trim().to_ascii_lowercase().as_str() {
        "lax" => Ok(CookieSameSite::Lax),
        "strict" => Ok(CookieSameSite::Strict),
        "none" => Ok(CookieSameSite::None),
        other => Err(anyhow!(
            "Unsupported cookie same-site policy '{other}'. Use Lax, Strict, or None."
        )),
    }
}
