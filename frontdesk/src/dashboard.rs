//! Dashboard view selection.
//!
//! The menu is the list of views the session may open, in category
//! priority order; the default view is its first entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::authz::gate::PermissionGate;
use crate::authz::permissions::Permission;
use crate::authz::policy::AuthorizationPolicy;
use crate::session::Session;

/// Cookie-session key holding the last view the user switched to.
pub const ACTIVE_VIEW_KEY: &str = "active_view";

/// Dashboard categories, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Admin,
    Finance,
    Coordination,
    Therapy,
    Reception,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardView {
    Staff,
    Finances,
    Scheduling,
    Therapy,
    Logbook,
    Registrations,
}

impl DashboardView {
    /// Every view in priority order.
    pub const ALL: [DashboardView; 6] = [
        DashboardView::Staff,
        DashboardView::Finances,
        DashboardView::Scheduling,
        DashboardView::Therapy,
        DashboardView::Logbook,
        DashboardView::Registrations,
    ];

    pub fn category(&self) -> Category {
        match self {
            DashboardView::Staff => Category::Admin,
            DashboardView::Finances => Category::Finance,
            DashboardView::Scheduling => Category::Coordination,
            DashboardView::Therapy => Category::Therapy,
            DashboardView::Logbook | DashboardView::Registrations => Category::Reception,
        }
    }

    pub fn gate(&self) -> PermissionGate {
        match self {
            DashboardView::Staff => PermissionGate::single(Permission::AdminAccessPanel),
            DashboardView::Finances => PermissionGate::any([
                Permission::FinanceViewInvoices,
                Permission::FinanceViewExpenses,
            ]),
            DashboardView::Scheduling => PermissionGate::single(Permission::AppointmentViewOthers),
            // therapists edit their own sessions; reception only books them
            DashboardView::Therapy => PermissionGate::all([
                Permission::AppointmentViewList,
                Permission::AppointmentEdit,
            ]),
            DashboardView::Logbook => PermissionGate::single(Permission::LogbookView),
            DashboardView::Registrations => {
                PermissionGate::any([Permission::PatientViewList, Permission::GuestViewList])
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DashboardView::Staff => "staff",
            DashboardView::Finances => "finances",
            DashboardView::Scheduling => "scheduling",
            DashboardView::Therapy => "therapy",
            DashboardView::Logbook => "logbook",
            DashboardView::Registrations => "registrations",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DashboardView::Staff => "Staff",
            DashboardView::Finances => "Finances",
            DashboardView::Scheduling => "Scheduling",
            DashboardView::Therapy => "My Appointments",
            DashboardView::Logbook => "Logbook",
            DashboardView::Registrations => "Registrations",
        }
    }
}

/// An entry point offered inside a dashboard view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewAction {
    pub label: &'static str,
    pub href: Option<&'static str>,
    pub gate: PermissionGate,
}

impl ViewAction {
    fn new(label: &'static str, href: Option<&'static str>, gate: PermissionGate) -> Self {
        Self { label, href, gate }
    }
}

impl DashboardView {
    /// Actions of this view; each one is shown only when its gate passes.
    pub fn actions(&self) -> Vec<ViewAction> {
        use PermissionGate as Gate;
        match self {
            DashboardView::Staff => vec![
                ViewAction::new("Staff directory", None, Gate::single(Permission::StaffViewList)),
                ViewAction::new(
                    "Invite staff member",
                    Some("/staff/new"),
                    Gate::single(Permission::StaffCreate),
                ),
                ViewAction::new(
                    "Roles and permissions",
                    Some("/staff/new#roles"),
                    Gate::all([Permission::StaffCreate, Permission::StaffEditRoles]),
                ),
                ViewAction::new(
                    "Institution settings",
                    None,
                    Gate::single(Permission::InstitutionEditSettings),
                ),
            ],
            DashboardView::Finances => vec![
                ViewAction::new("Invoices", None, Gate::single(Permission::FinanceViewInvoices)),
                ViewAction::new("Issue invoice", None, Gate::single(Permission::FinanceManageInvoices)),
                ViewAction::new("Expenses", None, Gate::single(Permission::FinanceViewExpenses)),
                ViewAction::new("Record expense", None, Gate::single(Permission::FinanceManageExpenses)),
            ],
            DashboardView::Scheduling => vec![
                ViewAction::new("All appointments", None, Gate::single(Permission::AppointmentViewOthers)),
                ViewAction::new("Book appointment", None, Gate::single(Permission::AppointmentCreate)),
            ],
            DashboardView::Therapy => vec![
                ViewAction::new("My appointments", None, Gate::single(Permission::AppointmentViewList)),
                ViewAction::new(
                    "Patient records",
                    None,
                    Gate::all([Permission::PatientViewList, Permission::PatientViewDetails]),
                ),
            ],
            DashboardView::Logbook => vec![
                ViewAction::new("Open logbook", Some("/logbook"), Gate::single(Permission::LogbookView)),
                ViewAction::new(
                    "Check in a visitor",
                    Some("/logbook#check-in"),
                    Gate::all([Permission::LogbookView, Permission::LogbookCreate]),
                ),
            ],
            DashboardView::Registrations => vec![
                ViewAction::new("Patients", None, Gate::single(Permission::PatientViewList)),
                ViewAction::new("Register patient", None, Gate::single(Permission::PatientCreate)),
                ViewAction::new("Guests", None, Gate::single(Permission::GuestViewList)),
                ViewAction::new("Register guest", None, Gate::single(Permission::GuestCreate)),
            ],
        }
    }
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown dashboard view: {0}")]
pub struct UnknownView(pub String);

impl FromStr for DashboardView {
    type Err = UnknownView;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DashboardView::ALL
            .into_iter()
            .find(|view| view.as_str() == s)
            .ok_or_else(|| UnknownView(s.to_string()))
    }
}

pub struct DashboardRouter<'a> {
    policy: &'a dyn AuthorizationPolicy,
}

impl<'a> DashboardRouter<'a> {
    pub fn new(policy: &'a dyn AuthorizationPolicy) -> Self {
        Self { policy }
    }

    /// Views the session may open, highest priority first.
    pub fn menu(&self, session: &Session) -> Vec<DashboardView> {
        DashboardView::ALL
            .into_iter()
            .filter(|view| view.gate().allows_with(self.policy, session))
            .collect()
    }

    pub fn default_view(&self, session: &Session) -> Option<DashboardView> {
        self.menu(session).into_iter().next()
    }

    /// The remembered view while it is still on the menu, else the default.
    pub fn active_view(
        &self,
        session: &Session,
        remembered: Option<DashboardView>,
    ) -> Option<DashboardView> {
        let menu = self.menu(session);
        remembered
            .filter(|view| menu.contains(view))
            .or_else(|| menu.first().copied())
    }

    /// Accept `requested` only when it is a menu entry.
    pub fn switch_to(
        &self,
        session: &Session,
        requested: DashboardView,
    ) -> Option<DashboardView> {
        self.menu(session)
            .contains(&requested)
            .then_some(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::permissions::PermissionSet;
    use crate::authz::policy::OwnerBypassPolicy;
    use crate::authz::roles::StaffRole;
    use crate::models::{Identity, Profile, UserId};

    fn session_with(permissions: PermissionSet, is_owner: bool) -> Session {
        let identity = Identity {
            id: UserId::new(),
            email: "dash@clinic.test".to_string(),
        };
        let profile = Profile {
            id: identity.id,
            name: "Dash".to_string(),
            email: identity.email.clone(),
            organization_id: None,
            organization_name: None,
            is_owner,
        };
        Session::resolved(identity, profile, permissions)
    }

    fn router() -> DashboardRouter<'static> {
        DashboardRouter::new(&OwnerBypassPolicy)
    }

    #[test]
    fn test_owner_defaults_to_admin_view() {
        let session = session_with(PermissionSet::new(), true);
        assert_eq!(router().menu(&session), DashboardView::ALL.to_vec());
        assert_eq!(router().default_view(&session), Some(DashboardView::Staff));
    }

    #[test]
    fn test_priority_across_categories() {
        let session = session_with(
            [
                Permission::LogbookView,
                Permission::AppointmentViewList,
                Permission::AppointmentEdit,
                Permission::FinanceViewExpenses,
            ]
            .into(),
            false,
        );
        assert_eq!(
            router().menu(&session),
            vec![
                DashboardView::Finances,
                DashboardView::Therapy,
                DashboardView::Logbook
            ]
        );
        assert_eq!(router().default_view(&session), Some(DashboardView::Finances));
    }

    #[test]
    fn test_receptionist_menu() {
        let session = session_with(
            StaffRole::Receptionist.permissions().iter().copied().collect(),
            false,
        );
        assert_eq!(
            router().menu(&session),
            vec![DashboardView::Logbook, DashboardView::Registrations]
        );
        assert_eq!(router().default_view(&session), Some(DashboardView::Logbook));
    }

    #[test]
    fn test_therapist_defaults_to_own_appointments() {
        let session = session_with(
            StaffRole::Therapist.permissions().iter().copied().collect(),
            false,
        );
        assert_eq!(router().default_view(&session), Some(DashboardView::Therapy));
    }

    #[test]
    fn test_coordinator_defaults_to_scheduling() {
        let session = session_with(
            StaffRole::Coordinator.permissions().iter().copied().collect(),
            false,
        );
        assert_eq!(router().default_view(&session), Some(DashboardView::Scheduling));
    }

    #[test]
    fn test_switch_only_within_menu() {
        let session = session_with([Permission::LogbookView, Permission::GuestViewList].into(), false);
        assert_eq!(
            router().switch_to(&session, DashboardView::Registrations),
            Some(DashboardView::Registrations)
        );
        assert_eq!(router().switch_to(&session, DashboardView::Staff), None);
    }

    #[test]
    fn test_remembered_view_dropped_when_no_longer_permitted() {
        let session = session_with([Permission::LogbookView].into(), false);
        assert_eq!(
            router().active_view(&session, Some(DashboardView::Finances)),
            Some(DashboardView::Logbook)
        );
        assert_eq!(router().active_view(&Session::anonymous(), None), None);
    }

    #[test]
    fn test_actions_are_gated() {
        let session = session_with([Permission::LogbookView].into(), false);
        let visible: Vec<&str> = DashboardView::Logbook
            .actions()
            .into_iter()
            .filter_map(|action| action.gate.show(&session, action.label))
            .collect();
        assert_eq!(visible, vec!["Open logbook"]);
    }

    #[test]
    fn test_staff_actions_link_to_creation() {
        let session = session_with(
            [
                Permission::AdminAccessPanel,
                Permission::StaffCreate,
                Permission::StaffEditRoles,
            ]
            .into(),
            false,
        );
        let links: Vec<(&str, Option<&str>)> = DashboardView::Staff
            .actions()
            .into_iter()
            .filter_map(|action| action.gate.show(&session, (action.label, action.href)))
            .collect();
        assert_eq!(
            links,
            vec![
                ("Invite staff member", Some("/staff/new")),
                ("Roles and permissions", Some("/staff/new#roles")),
            ]
        );
    }

    #[test]
    fn test_parse_view() {
        assert_eq!("scheduling".parse::<DashboardView>().unwrap(), DashboardView::Scheduling);
        assert!("billing".parse::<DashboardView>().is_err());
    }
}
