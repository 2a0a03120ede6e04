pub mod claims;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod roles;

pub use claims::{AuthResult, Token, TokenClaims};
pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::TokenCodec;
pub use config::JwtConfig;
pub use error::{AuthError, Result, INVALID_CREDENTIALS_MESSAGE, INVALID_TOKEN_MESSAGE};
pub use extractors::{bearer_from_headers, parse_bearer, AuthContext};
pub use guards::{ensure_role, GuardError};
pub use roles::{Role, RoleSet, UnknownRole, ROLE_DELIMITER};
