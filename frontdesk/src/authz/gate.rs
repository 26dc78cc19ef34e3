//! Render-time permission gate.
//!
//! Decides whether a fragment of a page is shown for the current session.
//! Holds no state: evaluate it against the latest session snapshot every
//! time the fragment is rendered.

use super::permissions::Permission;
use super::policy::{AuthorizationPolicy, OwnerBypassPolicy};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionGate {
    /// No requirement; always shows the content.
    Open,
    Single(Permission),
    Many {
        permissions: Vec<Permission>,
        require_all: bool,
    },
}

impl PermissionGate {
    pub fn single(permission: Permission) -> Self {
        PermissionGate::Single(permission)
    }

    pub fn any(permissions: impl IntoIterator<Item = Permission>) -> Self {
        PermissionGate::Many {
            permissions: permissions.into_iter().collect(),
            require_all: false,
        }
    }

    pub fn all(permissions: impl IntoIterator<Item = Permission>) -> Self {
        PermissionGate::Many {
            permissions: permissions.into_iter().collect(),
            require_all: true,
        }
    }

    pub fn allows_with(&self, policy: &dyn AuthorizationPolicy, session: &Session) -> bool {
        match self {
            PermissionGate::Open => true,
            PermissionGate::Single(permission) => policy.has_permission(session, *permission),
            PermissionGate::Many {
                permissions,
                require_all: true,
            } => policy.has_all(session, permissions),
            PermissionGate::Many {
                permissions,
                require_all: false,
            } => policy.has_any(session, permissions),
        }
    }

    pub fn allows(&self, session: &Session) -> bool {
        self.allows_with(&OwnerBypassPolicy, session)
    }

    /// `content` when allowed, otherwise `fallback`.
    pub fn render<T>(&self, session: &Session, content: T, fallback: T) -> T {
        if self.allows(session) { content } else { fallback }
    }

    /// `content` when allowed, otherwise nothing.
    pub fn show<T>(&self, session: &Session, content: T) -> Option<T> {
        self.allows(session).then_some(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::permissions::PermissionSet;
    use crate::models::{Identity, Profile, UserId};

    fn session_with(permissions: PermissionSet, is_owner: bool) -> Session {
        let identity = Identity {
            id: UserId::new(),
            email: "gate@clinic.test".to_string(),
        };
        let profile = Profile {
            id: identity.id,
            name: "Gate Tester".to_string(),
            email: identity.email.clone(),
            organization_id: None,
            organization_name: None,
            is_owner,
        };
        Session::resolved(identity, profile, permissions)
    }

    #[test]
    fn test_single_gate() {
        let session = session_with([Permission::RbacCreateRole].into(), false);
        assert_eq!(
            PermissionGate::single(Permission::RbacCreateRole).show(&session, "create"),
            Some("create")
        );
        assert_eq!(
            PermissionGate::single(Permission::RbacDeleteRole).show(&session, "delete"),
            None
        );
    }

    #[test]
    fn test_many_gate_any_vs_all() {
        let session = session_with([Permission::GuestCreate].into(), false);
        let needed = [Permission::GuestCreate, Permission::PatientCreate];

        assert!(PermissionGate::any(needed).allows(&session));
        assert!(!PermissionGate::all(needed).allows(&session));
        assert_eq!(
            PermissionGate::all(needed).render(&session, "form", "read-only"),
            "read-only"
        );
    }

    #[test]
    fn test_open_gate_and_owner() {
        let anonymous = Session::anonymous();
        assert!(PermissionGate::Open.allows(&anonymous));
        assert!(!PermissionGate::any([Permission::LogbookView]).allows(&anonymous));

        let owner = session_with(PermissionSet::new(), true);
        assert!(PermissionGate::all(Permission::ALL).allows(&owner));
    }

    #[test]
    fn test_reevaluates_against_new_snapshot() {
        let gate = PermissionGate::single(Permission::LogbookCreate);
        let before = session_with(PermissionSet::new(), false);
        let after = session_with([Permission::LogbookCreate].into(), false);
        assert!(!gate.allows(&before));
        assert!(gate.allows(&after));
    }
}
