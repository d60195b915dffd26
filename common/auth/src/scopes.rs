pub const SCOPE_ORDERS_READ: &str = "orders:read";
pub const SCOPE_ORDERS_WRITE: &str = "orders:write";

/// Scopes that may call order endpoints.
pub const ORDER_SCOPES: &[&str] = &[SCOPE_ORDERS_READ, SCOPE_ORDERS_WRITE];
