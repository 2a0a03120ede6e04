pub mod context;
pub mod error;
pub mod headers;
pub mod roles;

pub use context::{GatewayIdentity, SecurityContext};
pub use error::SecurityError;
pub use headers::{
    TRUSTED_IDENTITY_HEADERS, X_AUTH_VALID, X_CLIENT_IP, X_GATEWAY_VALIDATED, X_USER_ROLES,
    X_USER_USERNAME,
};
pub use roles::{ensure_any_role, ensure_role};
pub use common_auth::{Role, RoleSet};
