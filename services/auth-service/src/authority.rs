use common_auth::roles;
use common_auth::{Role, RoleSet};

use crate::store::Principal;

/// Maps principals to the roles carried in their tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorityResolver;

impl AuthorityResolver {
    /// Declaration order, so equal role sets always serialise identically.
    /// A principal without roles is treated as a plain USER.
    pub fn roles_for(&self, principal: &Principal) -> Vec<Role> {
        self.role_set_for(principal).to_vec()
    }

    pub fn role_set_for(&self, principal: &Principal) -> RoleSet {
        if principal.roles.is_empty() {
            RoleSet::single(Role::User)
        } else {
            principal.roles.clone()
        }
    }

    pub fn serialize(&self, roles: &[Role]) -> String {
        roles::serialize(roles.iter().copied().collect::<RoleSet>().iter())
    }

    pub fn deserialize(&self, value: &str) -> RoleSet {
        roles::deserialize(value)
    }
}
