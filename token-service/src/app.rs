use std::sync::Arc;

use anyhow::{Context, Result};
use argon2::Params;
use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::Router;
use common_auth::{AccessGuard, ClaimsCodec, Clock, InMemoryRefreshLedger, RefreshLedger, SystemClock};
use tracing::info;

use crate::config::ServiceConfig;
use crate::credentials::{CredentialStore, InMemoryPrincipalStore, PrincipalStore};
use crate::handlers::{
    health, issue_service_token, login, logout, metrics_endpoint, protected, refresh,
    service_orders,
};
use crate::metrics::AuthMetrics;
use crate::tokens::TokenIssuer;

#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialStore>,
    pub issuer: Arc<TokenIssuer>,
    pub guard: Arc<AccessGuard>,
    pub config: Arc<ServiceConfig>,
    pub metrics: Arc<AuthMetrics>,
}

impl FromRef<AppState> for Arc<AccessGuard> {
    fn from_ref(state: &AppState) -> Self {
        state.guard.clone()
    }
}

impl FromRef<AppState> for Arc<ServiceConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

/// Collaborators that can be swapped for persistent backends or test doubles.
pub struct Backends {
    pub principals: Arc<dyn PrincipalStore>,
    pub ledger: Arc<dyn RefreshLedger>,
    pub clock: Arc<dyn Clock>,
    pub hash_params: Params,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            principals: Arc::new(InMemoryPrincipalStore::new()),
            ledger: Arc::new(InMemoryRefreshLedger::new()),
            clock: Arc::new(SystemClock),
            hash_params: Params::default(),
        }
    }
}

impl AppState {
    pub async fn from_config(config: ServiceConfig) -> Result<Self> {
        Self::with_backends(config, Backends::default()).await
    }

    /// Wire the core components and register the configured principals.
    pub async fn with_backends(config: ServiceConfig, backends: Backends) -> Result<Self> {
        config.validate()?;

        let codec = Arc::new(
            ClaimsCodec::with_clock(config.jwt.clone(), backends.clock)
                .context("Failed to initialise claims codec")?,
        );
        let guard = Arc::new(AccessGuard::new(codec.clone(), backends.ledger.clone()));
        let issuer = Arc::new(
            TokenIssuer::new(codec, backends.ledger, config.tokens.clone())
                .context("Failed to initialise token issuer")?,
        );
        let credentials = Arc::new(
            CredentialStore::with_params(backends.principals, backends.hash_params)
                .context("Failed to initialise credential store")?,
        );

        for seed in &config.principals {
            credentials
                .register(
                    &seed.id,
                    &seed.secret,
                    seed.scope.as_deref(),
                    seed.audience.as_deref(),
                )
                .await
                .with_context(|| format!("Failed to register principal '{}'", seed.id))?;
        }
        info!(
            principals = config.principals.len(),
            profile = config.profile.as_str(),
            "credential store ready"
        );

        Ok(Self {
            credentials,
            issuer,
            guard,
            config: Arc::new(config),
            metrics: Arc::new(AuthMetrics::new()?),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/protected", get(protected))
        .route("/token", post(issue_service_token))
        .route("/service/orders", get(service_orders))
        .with_state(state)
}
