//! Authorization oracle boundary. The identity store itself is an external
//! collaborator; the core only ever asks "what role does this caller have".

use std::collections::HashMap;

use wipeforge_core::Role;

pub trait RoleOracle: Send + Sync {
    fn role_of(&self, identity: &str) -> Role;
}

/// Map-backed oracle for CLIs and tests.
pub struct StaticRoleOracle {
    roles: HashMap<String, Role>,
    default_role: Role,
}

impl StaticRoleOracle {
    pub fn new(default_role: Role) -> Self {
        Self {
            roles: HashMap::new(),
            default_role,
        }
    }

    pub fn with_role(mut self, identity: impl Into<String>, role: Role) -> Self {
        self.roles.insert(identity.into(), role);
        self
    }
}

impl RoleOracle for StaticRoleOracle {
    fn role_of(&self, identity: &str) -> Role {
        self.roles
            .get(identity)
            .copied()
            .unwrap_or(self.default_role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_identities_get_the_default_role() {
        let oracle = StaticRoleOracle::new(Role::None).with_role("op@example.com", Role::Operator);
        assert_eq!(oracle.role_of("op@example.com"), Role::Operator);
        assert_eq!(oracle.role_of("stranger@example.com"), Role::None);
    }
}
