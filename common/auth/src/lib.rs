pub mod claims;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod ledger;
pub mod scopes;

pub use claims::{ClaimSet, TokenKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::ClaimsCodec;
pub use config::{parse_algorithm, JwtConfig, PLACEHOLDER_SECRET};
pub use error::{AuthError, AuthResult};
pub use extractors::{cookie_value, parse_bearer, AuthContext, BearerToken};
pub use guards::{ensure_scope, AccessGuard, VerifiedAccess};
pub use ledger::{InMemoryRefreshLedger, RefreshLedger};
pub use scopes::{ORDER_SCOPES, SCOPE_ORDERS_READ, SCOPE_ORDERS_WRITE};
