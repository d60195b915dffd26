#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use argon2::Params;
use axum::body::Body;
use axum::http::{header::SET_COOKIE, Response};
use common_auth::{InMemoryRefreshLedger, JwtConfig, ManualClock};
use http_body_util::BodyExt;
use serde_json::Value;
use token_service::config::{
    CookieSameSite, PrincipalSeed, Profile, RefreshCookieConfig, ServiceConfig,
};
use token_service::{AppState, Backends, InMemoryPrincipalStore, TokenConfig};

pub const START: i64 = 1_700_000_000;
pub const TEST_SECRET: &str = "integration-test-secret";
pub const SERVICE_AUDIENCE: &str = "service-b";

pub struct TestApp {
    pub state: AppState,
    pub clock: ManualClock,
    pub ledger: Arc<InMemoryRefreshLedger>,
}

pub fn seed(id: &str, secret: &str, scope: Option<&str>, audience: Option<&str>) -> PrincipalSeed {
    PrincipalSeed {
        id: id.to_string(),
        secret: secret.to_string(),
        scope: scope.map(str::to_owned),
        audience: audience.map(str::to_owned),
    }
}

pub fn test_config(principals: Vec<PrincipalSeed>) -> ServiceConfig {
    ServiceConfig {
        profile: Profile::Development,
        jwt: JwtConfig::new(TEST_SECRET, "token-service-tests"),
        tokens: TokenConfig {
            access_ttl_seconds: 300,
            refresh_ttl_seconds: 7 * 86_400,
        },
        service_audience: SERVICE_AUDIENCE.to_string(),
        principals,
        cookie: RefreshCookieConfig {
            name: "refresh_token".to_string(),
            domain: None,
            secure: false,
            same_site: CookieSameSite::Lax,
        },
        host: "127.0.0.1".to_string(),
        port: 0,
    }
}

pub fn default_principals() -> Vec<PrincipalSeed> {
    vec![
        seed("svc-a", "s3cr3t", Some("orders:read"), None),
        seed("svc-b", "other", Some("orders:write"), Some(SERVICE_AUDIENCE)),
        seed("svc-c", "no-scope", None, None),
    ]
}

/// App state on a pinned clock with cheap Argon2 parameters.
pub async fn test_app(principals: Vec<PrincipalSeed>) -> Result<TestApp> {
    let clock = ManualClock::from_timestamp(START);
    let ledger = Arc::new(InMemoryRefreshLedger::new());
    let backends = Backends {
        principals: Arc::new(InMemoryPrincipalStore::new()),
        ledger: ledger.clone(),
        clock: Arc::new(clock.clone()),
        hash_params: Params::new(256, 1, 1, None).map_err(anyhow::Error::msg)?,
    };
    let state = AppState::with_backends(test_config(principals), backends).await?;
    Ok(TestApp {
        state,
        clock,
        ledger,
    })
}

pub async fn json_body(response: Response<Body>) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

/// `name=value` pair of the first Set-Cookie header, attributes stripped.
pub fn set_cookie_pair(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|pair| pair.trim().to_string())
}

pub fn set_cookie_header(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}
