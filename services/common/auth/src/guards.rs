use common_http_errors::ApiError;

use crate::extractors::AuthContext;
use crate::roles::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    Forbidden { required: Vec<Role> },
}

impl From<GuardError> for ApiError {
    fn from(value: GuardError) -> Self {
        match value {
            GuardError::Forbidden { required } => ApiError::ForbiddenMissingRole {
                role: required
                    .iter()
                    .map(Role::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            },
        }
    }
}

/// Passes when the caller holds at least one of `allowed`. An empty list
/// admits any authenticated caller.
pub fn ensure_role(auth: &AuthContext, allowed: &[Role]) -> Result<(), GuardError> {
    if allowed.is_empty() || auth.roles.contains_any(allowed) {
        return Ok(());
    }
    Err(GuardError::Forbidden {
        required: allowed.to_vec(),
    })
}
