//! Names of the identity headers the gateway injects after a token verifies.
//! Downstream services accept them only because they are reachable solely
//! through the gateway.

pub const X_USER_USERNAME: &str = "x-user-username";
pub const X_USER_ROLES: &str = "x-user-roles";
pub const X_AUTH_VALID: &str = "x-auth-valid";
pub const X_GATEWAY_VALIDATED: &str = "x-gateway-validated";
pub const X_CLIENT_IP: &str = "x-client-ip";

/// Every header a client must never be allowed to supply itself.
pub const TRUSTED_IDENTITY_HEADERS: [&str; 5] = [
    X_USER_USERNAME,
    X_USER_ROLES,
    X_AUTH_VALID,
    X_GATEWAY_VALIDATED,
    X_CLIENT_IP,
];
