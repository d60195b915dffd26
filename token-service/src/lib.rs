pub mod app;
pub mod config;
pub mod credentials;
pub mod handlers;
pub mod metrics;
pub mod tokens;

pub use app::{router, AppState, Backends};
pub use config::{load_service_config, load_service_config_from, ServiceConfig};
pub use credentials::{CredentialStore, InMemoryPrincipalStore, Principal, PrincipalStore};
pub use tokens::{IssuedTokens, TokenConfig, TokenIssuer};
