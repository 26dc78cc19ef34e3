//! Authorization evaluator.
//!
//! Pure functions over a [`Session`]: no I/O, no caching. Every check in the
//! application (route guard, permission gate, dashboard menu) goes through
//! the single [`AuthorizationPolicy`] defined here.

use super::permissions::Permission;
use super::roles::StaffRole;
use crate::session::Session;
use serde::Serialize;

/// What a route, view or fragment requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum Access {
    /// Any signed-in staff member.
    Authenticated,
    Permission(Permission),
    Any(Vec<Permission>),
    All(Vec<Permission>),
    Role(Vec<StaffRole>),
}

impl Access {
    pub fn any(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Access::Any(permissions.into_iter().collect())
    }

    pub fn all(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Access::All(permissions.into_iter().collect())
    }
}

pub trait AuthorizationPolicy: Send + Sync {
    /// Whether `session` holds `permission`.
    fn has_permission(&self, session: &Session, permission: Permission) -> bool;

    /// At least one of `permissions`; false for an empty list.
    fn has_any(&self, session: &Session, permissions: &[Permission]) -> bool {
        permissions
            .iter()
            .any(|permission| self.has_permission(session, *permission))
    }

    /// Every one of `permissions`; vacuously true for an empty list.
    fn has_all(&self, session: &Session, permissions: &[Permission]) -> bool {
        permissions
            .iter()
            .all(|permission| self.has_permission(session, *permission))
    }

    /// Holds the full bundle of at least one of `roles`.
    fn has_role(&self, session: &Session, roles: &[StaffRole]) -> bool {
        roles
            .iter()
            .any(|role| self.has_all(session, role.permissions()))
    }

    /// Evaluate an [`Access`] requirement. Never grants without a profile.
    fn check(&self, session: &Session, access: &Access) -> bool {
        if !session.is_authenticated() {
            return false;
        }
        match access {
            Access::Authenticated => true,
            Access::Permission(permission) => self.has_permission(session, *permission),
            Access::Any(permissions) => self.has_any(session, permissions),
            Access::All(permissions) => self.has_all(session, permissions),
            Access::Role(roles) => self.has_role(session, roles),
        }
    }
}

/// Explicit grants, with organization owners granted everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerBypassPolicy;

impl AuthorizationPolicy for OwnerBypassPolicy {
    fn has_permission(&self, session: &Session, permission: Permission) -> bool {
        session.is_owner() || session.permissions().contains(permission)
    }
}

pub fn has_permission(session: &Session, permission: Permission) -> bool {
    OwnerBypassPolicy.has_permission(session, permission)
}

pub fn has_any(session: &Session, permissions: &[Permission]) -> bool {
    OwnerBypassPolicy.has_any(session, permissions)
}

pub fn has_all(session: &Session, permissions: &[Permission]) -> bool {
    OwnerBypassPolicy.has_all(session, permissions)
}

pub fn has_role(session: &Session, roles: &[StaffRole]) -> bool {
    OwnerBypassPolicy.has_role(session, roles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::permissions::PermissionSet;
    use crate::models::{Identity, Profile, UserId};

    fn session_with(permissions: PermissionSet, is_owner: bool) -> Session {
        let identity = Identity {
            id: UserId::new(),
            email: "staff@clinic.test".to_string(),
        };
        let profile = Profile {
            id: identity.id,
            name: "Staff Member".to_string(),
            email: identity.email.clone(),
            organization_id: None,
            organization_name: None,
            is_owner,
        };
        Session::resolved(identity, profile, permissions)
    }

    const ADMIN: Permission = Permission::AdminAccessPanel;
    const FINANCE: Permission = Permission::FinanceViewInvoices;

    #[test]
    fn test_membership_decides_without_owner_flag() {
        let granted: PermissionSet = [Permission::LogbookView, Permission::GuestCreate].into();
        let session = session_with(granted.clone(), false);
        for permission in Permission::ALL {
            assert_eq!(
                has_permission(&session, permission),
                granted.contains(permission),
                "{}",
                permission
            );
        }
    }

    #[test]
    fn test_owner_bypass_grants_everything() {
        let session = session_with(PermissionSet::new(), true);
        for permission in Permission::ALL {
            assert!(has_permission(&session, permission));
        }
        assert!(has_role(&session, &[StaffRole::Admin]));
        assert!(OwnerBypassPolicy.check(&session, &Access::all(Permission::ALL)));
    }

    #[test]
    fn test_empty_lists() {
        let session = session_with(PermissionSet::new(), false);
        assert!(has_all(&session, &[]));
        assert!(!has_any(&session, &[]));
        assert!(!has_role(&session, &[]));

        let owner = session_with(PermissionSet::new(), true);
        assert!(!has_any(&owner, &[]));
    }

    #[test]
    fn test_finance_only_scenario() {
        let session = session_with([FINANCE].into(), false);
        let policy = OwnerBypassPolicy;

        assert!(!policy.check(&session, &Access::Permission(ADMIN)));
        assert!(policy.check(&session, &Access::Permission(FINANCE)));
        assert!(policy.check(&session, &Access::any([FINANCE, ADMIN])));
        assert!(!policy.check(&session, &Access::all([FINANCE, ADMIN])));
    }

    #[test]
    fn test_role_requires_whole_bundle() {
        let partial: PermissionSet = StaffRole::Receptionist
            .permissions()
            .iter()
            .copied()
            .skip(1)
            .collect();
        assert!(!has_role(&session_with(partial, false), &[StaffRole::Receptionist]));

        let full: PermissionSet = StaffRole::Receptionist.permissions().iter().copied().collect();
        let session = session_with(full, false);
        assert!(has_role(&session, &[StaffRole::Admin, StaffRole::Receptionist]));
        assert!(!has_role(&session, &[StaffRole::Admin]));
    }

    #[test]
    fn test_check_denies_without_profile() {
        assert!(!OwnerBypassPolicy.check(&Session::anonymous(), &Access::Authenticated));
        assert!(!OwnerBypassPolicy.check(&Session::initial(), &Access::all([])));
    }
}
