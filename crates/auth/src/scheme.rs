use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hrdesk_core::Role;

/// Role identifiers that appear in the built-in schemes.
pub mod well_known {
    use hrdesk_core::Role;

    pub const ADMIN: Role = Role::from_static("admin");
    pub const MANAGER: Role = Role::from_static("manager");
    pub const EMPLOYEE: Role = Role::from_static("employee");
    pub const HR: Role = Role::from_static("hr");
    pub const USER: Role = Role::from_static("user");
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoleSchemeError {
    #[error("role scheme must define at least one role")]
    Empty,

    #[error("admin-equivalent role '{0}' is not part of the scheme")]
    UnknownAdminRole(Role),

    #[error("unknown role scheme '{0}' (expected four_role or binary)")]
    UnknownScheme(String),
}

/// The set of role identifiers in use, plus which of them are admin-equivalent.
///
/// Stored role strings drifted between a four-role enum and an admin/user
/// binary; the scheme is configured rather than hard-coded, and a stored role
/// the scheme does not know is reported as unknown, never mapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleScheme {
    roles: BTreeSet<Role>,
    admin_equivalent: BTreeSet<Role>,
}

impl RoleScheme {
    pub fn new(
        roles: impl IntoIterator<Item = Role>,
        admin_equivalent: impl IntoIterator<Item = Role>,
    ) -> Result<Self, RoleSchemeError> {
        let roles: BTreeSet<Role> = roles.into_iter().collect();
        if roles.is_empty() {
            return Err(RoleSchemeError::Empty);
        }
        let admin_equivalent: BTreeSet<Role> = admin_equivalent.into_iter().collect();
        if let Some(unknown) = admin_equivalent.iter().find(|r| !roles.contains(*r)) {
            return Err(RoleSchemeError::UnknownAdminRole(unknown.clone()));
        }
        Ok(Self {
            roles,
            admin_equivalent,
        })
    }

    /// admin, manager, employee, hr (admin is admin-equivalent).
    pub fn four_role() -> Self {
        Self {
            roles: [
                well_known::ADMIN,
                well_known::MANAGER,
                well_known::EMPLOYEE,
                well_known::HR,
            ]
            .into_iter()
            .collect(),
            admin_equivalent: [well_known::ADMIN].into_iter().collect(),
        }
    }

    /// admin, user (admin is admin-equivalent).
    pub fn binary() -> Self {
        Self {
            roles: [well_known::ADMIN, well_known::USER].into_iter().collect(),
            admin_equivalent: [well_known::ADMIN].into_iter().collect(),
        }
    }

    /// Built-in scheme by name (`four_role` or `binary`).
    pub fn by_name(name: &str) -> Result<Self, RoleSchemeError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "four_role" | "four-role" => Ok(Self::four_role()),
            "binary" => Ok(Self::binary()),
            other => Err(RoleSchemeError::UnknownScheme(other.to_string())),
        }
    }

    pub fn contains(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Map a stored role string onto a known role, if the scheme has one.
    pub fn recognize(&self, raw: &str) -> Option<Role> {
        self.roles.iter().find(|r| r.as_str() == raw).cloned()
    }

    pub fn is_admin_equivalent(&self, role: &Role) -> bool {
        self.admin_equivalent.contains(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.iter()
    }
}

impl Default for RoleScheme {
    fn default() -> Self {
        Self::four_role()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_schemes() {
        let four = RoleScheme::four_role();
        assert!(four.contains(&well_known::HR));
        assert!(!four.contains(&well_known::USER));
        assert!(four.is_admin_equivalent(&well_known::ADMIN));
        assert!(!four.is_admin_equivalent(&well_known::MANAGER));

        let binary = RoleScheme::binary();
        assert_eq!(binary.roles().count(), 2);
        assert_eq!(binary.recognize("user"), Some(well_known::USER));
        assert_eq!(binary.recognize("hr"), None);
    }

    #[test]
    fn custom_scheme_validates_admin_subset() {
        let err = RoleScheme::new([Role::new("staff")], [Role::new("root")]).unwrap_err();
        assert_eq!(err, RoleSchemeError::UnknownAdminRole(Role::new("root")));
        assert_eq!(
            RoleScheme::new(Vec::<Role>::new(), Vec::<Role>::new()),
            Err(RoleSchemeError::Empty)
        );

        let scheme =
            RoleScheme::new([Role::new("staff"), Role::new("root")], [Role::new("root")]).unwrap();
        assert!(scheme.is_admin_equivalent(&Role::new("root")));
    }

    #[test]
    fn scheme_by_name() {
        assert_eq!(RoleScheme::by_name("Binary").unwrap(), RoleScheme::binary());
        assert_eq!(RoleScheme::by_name("four_role").unwrap(), RoleScheme::four_role());
        assert!(matches!(
            RoleScheme::by_name("rbac"),
            Err(RoleSchemeError::UnknownScheme(_))
        ));
    }
}
