use common_auth::Role;
use tracing::warn;

use crate::context::SecurityContext;
use crate::SecurityError;

pub fn ensure_role(ctx: &SecurityContext, required: Role) -> Result<(), SecurityError> {
    if ctx.roles.contains(required) { return Ok(()); }
    warn!(username = %ctx.username, %required, roles = %ctx.roles, "role_check_failed");
    Err(SecurityError::MissingRole(vec![required]))
}

pub fn ensure_any_role(ctx: &SecurityContext, required: &[Role]) -> Result<(), SecurityError> {
    if ctx.roles.contains_any(required) { return Ok(()); }
    warn!(username = %ctx.username, ?required, roles = %ctx.roles, "any_role_check_failed");
    Err(SecurityError::MissingRole(required.to_vec()))
}
