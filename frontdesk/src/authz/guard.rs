//! Route guard decision.
//!
//! The guard only observes the session; it never starts a fetch. The HTTP
//! wiring lives in `middleware::guard`.

use super::policy::{Access, AuthorizationPolicy};
use crate::session::Session;

/// Where unauthenticated (or unresolvable) sessions are sent.
pub const AUTH_ENTRY: &str = "/auth";

/// Where sessions lacking the required permissions are sent.
pub const UNAUTHORIZED: &str = "/unauthorized";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// The session is still resolving; show a loading state.
    Loading,
    Authorized,
    Redirect(&'static str),
}

impl GuardDecision {
    pub fn label(&self) -> &'static str {
        match self {
            GuardDecision::Loading => "loading",
            GuardDecision::Authorized => "authorized",
            GuardDecision::Redirect(AUTH_ENTRY) => "unauthenticated",
            GuardDecision::Redirect(_) => "denied",
        }
    }
}

pub struct RouteGuard<'a> {
    policy: &'a dyn AuthorizationPolicy,
}

impl<'a> RouteGuard<'a> {
    pub fn new(policy: &'a dyn AuthorizationPolicy) -> Self {
        Self { policy }
    }

    pub fn evaluate(&self, session: &Session, access: &Access) -> GuardDecision {
        if session.is_loading() {
            return GuardDecision::Loading;
        }
        if session.is_failed() || !session.is_authenticated() {
            return GuardDecision::Redirect(AUTH_ENTRY);
        }
        if self.policy.check(session, access) {
            GuardDecision::Authorized
        } else {
            GuardDecision::Redirect(UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::permissions::{Permission, PermissionSet};
    use crate::authz::policy::OwnerBypassPolicy;
    use crate::models::{Identity, Profile, UserId};

    fn identity() -> Identity {
        Identity {
            id: UserId::new(),
            email: "guard@clinic.test".to_string(),
        }
    }

    fn session_with(permissions: PermissionSet, is_owner: bool) -> Session {
        let identity = identity();
        let profile = Profile {
            id: identity.id,
            name: "Guarded".to_string(),
            email: identity.email.clone(),
            organization_id: None,
            organization_name: None,
            is_owner,
        };
        Session::resolved(identity, profile, permissions)
    }

    fn evaluate(session: &Session, access: &Access) -> GuardDecision {
        RouteGuard::new(&OwnerBypassPolicy).evaluate(session, access)
    }

    #[test]
    fn test_loading_wins_over_any_requirement() {
        for access in [
            Access::Authenticated,
            Access::Permission(Permission::AdminAccessPanel),
            Access::all(Permission::ALL),
        ] {
            assert_eq!(evaluate(&Session::initial(), &access), GuardDecision::Loading);
            assert_eq!(
                evaluate(&Session::pending(identity()), &access),
                GuardDecision::Loading
            );
        }
    }

    #[test]
    fn test_anonymous_redirects_to_auth_entry() {
        assert_eq!(
            evaluate(&Session::anonymous(), &Access::Authenticated),
            GuardDecision::Redirect(AUTH_ENTRY)
        );
    }

    #[test]
    fn test_failed_resolution_is_denied() {
        let session = Session::failed(Some(identity()), "profiles timed out");
        assert_eq!(
            evaluate(&session, &Access::Authenticated),
            GuardDecision::Redirect(AUTH_ENTRY)
        );
    }

    #[test]
    fn test_missing_permission_redirects_to_unauthorized() {
        let session = session_with([Permission::FinanceViewInvoices].into(), false);
        assert_eq!(
            evaluate(&session, &Access::Permission(Permission::AdminAccessPanel)),
            GuardDecision::Redirect(UNAUTHORIZED)
        );
        assert_eq!(
            evaluate(&session, &Access::Permission(Permission::FinanceViewInvoices)),
            GuardDecision::Authorized
        );
    }

    #[test]
    fn test_owner_passes_every_gate() {
        let session = session_with(PermissionSet::new(), true);
        assert_eq!(
            evaluate(&session, &Access::all(Permission::ALL)),
            GuardDecision::Authorized
        );
    }

    #[test]
    fn test_decision_labels() {
        assert_eq!(GuardDecision::Redirect(AUTH_ENTRY).label(), "unauthenticated");
        assert_eq!(GuardDecision::Redirect(UNAUTHORIZED).label(), "denied");
    }
}
