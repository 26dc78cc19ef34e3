//! Permission registry.
//!
//! The closed catalog of fine-grained `<subject>:<action>` permissions a staff
//! member can be granted, plus the labeled groups used when presenting them.
//! Groups exist for presentation only and carry no authorization meaning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    // Patients
    #[serde(rename = "patient:view_list")]
    PatientViewList,
    #[serde(rename = "patient:view_details")]
    PatientViewDetails,
    #[serde(rename = "patient:create")]
    PatientCreate,
    #[serde(rename = "patient:edit")]
    PatientEdit,
    #[serde(rename = "patient:delete")]
    PatientDelete,
    #[serde(rename = "patient:view_sensitive")]
    PatientViewSensitive,

    // Appointments
    #[serde(rename = "appointment:view_list")]
    AppointmentViewList,
    #[serde(rename = "appointment:view_others")]
    AppointmentViewOthers,
    #[serde(rename = "appointment:create")]
    AppointmentCreate,
    #[serde(rename = "appointment:edit")]
    AppointmentEdit,
    #[serde(rename = "appointment:delete")]
    AppointmentDelete,

    // Logbook
    #[serde(rename = "logbook:view")]
    LogbookView,
    #[serde(rename = "logbook:create")]
    LogbookCreate,
    #[serde(rename = "logbook:edit_own")]
    LogbookEditOwn,
    #[serde(rename = "logbook:edit_all")]
    LogbookEditAll,
    #[serde(rename = "logbook:delete")]
    LogbookDelete,

    // Guests
    #[serde(rename = "guest:view_list")]
    GuestViewList,
    #[serde(rename = "guest:create")]
    GuestCreate,
    #[serde(rename = "guest:edit")]
    GuestEdit,
    #[serde(rename = "guest:delete")]
    GuestDelete,

    // Staff
    #[serde(rename = "staff:view_list")]
    StaffViewList,
    #[serde(rename = "staff:create")]
    StaffCreate,
    #[serde(rename = "staff:edit_details")]
    StaffEditDetails,
    #[serde(rename = "staff:edit_roles")]
    StaffEditRoles,
    #[serde(rename = "staff:deactivate")]
    StaffDeactivate,

    // Finance
    #[serde(rename = "finance:view_invoices")]
    FinanceViewInvoices,
    #[serde(rename = "finance:manage_invoices")]
    FinanceManageInvoices,
    #[serde(rename = "finance:view_expenses")]
    FinanceViewExpenses,
    #[serde(rename = "finance:manage_expenses")]
    FinanceManageExpenses,

    // Admin
    #[serde(rename = "admin:access_panel")]
    AdminAccessPanel,
    #[serde(rename = "rbac:view_roles")]
    RbacViewRoles,
    #[serde(rename = "rbac:create_role")]
    RbacCreateRole,
    #[serde(rename = "rbac:edit_role")]
    RbacEditRole,
    #[serde(rename = "rbac:delete_role")]
    RbacDeleteRole,
    #[serde(rename = "institution:edit_settings")]
    InstitutionEditSettings,
}

impl Permission {
    pub const ALL: [Permission; 35] = [
        Permission::PatientViewList,
        Permission::PatientViewDetails,
        Permission::PatientCreate,
        Permission::PatientEdit,
        Permission::PatientDelete,
        Permission::PatientViewSensitive,
        Permission::AppointmentViewList,
        Permission::AppointmentViewOthers,
        Permission::AppointmentCreate,
        Permission::AppointmentEdit,
        Permission::AppointmentDelete,
        Permission::LogbookView,
        Permission::LogbookCreate,
        Permission::LogbookEditOwn,
        Permission::LogbookEditAll,
        Permission::LogbookDelete,
        Permission::GuestViewList,
        Permission::GuestCreate,
        Permission::GuestEdit,
        Permission::GuestDelete,
        Permission::StaffViewList,
        Permission::StaffCreate,
        Permission::StaffEditDetails,
        Permission::StaffEditRoles,
        Permission::StaffDeactivate,
        Permission::FinanceViewInvoices,
        Permission::FinanceManageInvoices,
        Permission::FinanceViewExpenses,
        Permission::FinanceManageExpenses,
        Permission::AdminAccessPanel,
        Permission::RbacViewRoles,
        Permission::RbacCreateRole,
        Permission::RbacEditRole,
        Permission::RbacDeleteRole,
        Permission::InstitutionEditSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::PatientViewList => "patient:view_list",
            Permission::PatientViewDetails => "patient:view_details",
            Permission::PatientCreate => "patient:create",
            Permission::PatientEdit => "patient:edit",
            Permission::PatientDelete => "patient:delete",
            Permission::PatientViewSensitive => "patient:view_sensitive",
            Permission::AppointmentViewList => "appointment:view_list",
            Permission::AppointmentViewOthers => "appointment:view_others",
            Permission::AppointmentCreate => "appointment:create",
            Permission::AppointmentEdit => "appointment:edit",
            Permission::AppointmentDelete => "appointment:delete",
            Permission::LogbookView => "logbook:view",
            Permission::LogbookCreate => "logbook:create",
            Permission::LogbookEditOwn => "logbook:edit_own",
            Permission::LogbookEditAll => "logbook:edit_all",
            Permission::LogbookDelete => "logbook:delete",
            Permission::GuestViewList => "guest:view_list",
            Permission::GuestCreate => "guest:create",
            Permission::GuestEdit => "guest:edit",
            Permission::GuestDelete => "guest:delete",
            Permission::StaffViewList => "staff:view_list",
            Permission::StaffCreate => "staff:create",
            Permission::StaffEditDetails => "staff:edit_details",
            Permission::StaffEditRoles => "staff:edit_roles",
            Permission::StaffDeactivate => "staff:deactivate",
            Permission::FinanceViewInvoices => "finance:view_invoices",
            Permission::FinanceManageInvoices => "finance:manage_invoices",
            Permission::FinanceViewExpenses => "finance:view_expenses",
            Permission::FinanceManageExpenses => "finance:manage_expenses",
            Permission::AdminAccessPanel => "admin:access_panel",
            Permission::RbacViewRoles => "rbac:view_roles",
            Permission::RbacCreateRole => "rbac:create_role",
            Permission::RbacEditRole => "rbac:edit_role",
            Permission::RbacDeleteRole => "rbac:delete_role",
            Permission::InstitutionEditSettings => "institution:edit_settings",
        }
    }

    /// The `<subject>` half of the identifier.
    pub fn subject(&self) -> &'static str {
        self.as_str()
            .split_once(':')
            .map(|(subject, _)| subject)
            .unwrap_or_default()
    }

    /// The `<action>` half of the identifier.
    pub fn action(&self) -> &'static str {
        self.as_str()
            .split_once(':')
            .map(|(_, action)| action)
            .unwrap_or_default()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown permission: {0}")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

/// Set of granted permissions. Order is irrelevant and duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Permission; N]> for PermissionSet {
    fn from(permissions: [Permission; N]) -> Self {
        permissions.into_iter().collect()
    }
}

/// A labeled presentation group of permissions.
#[derive(Debug, Clone, Copy)]
pub struct PermissionGroup {
    pub key: &'static str,
    pub label: &'static str,
    pub permissions: &'static [(Permission, &'static str)],
}

pub const PERMISSION_GROUPS: [PermissionGroup; 7] = [
    PermissionGroup {
        key: "patients",
        label: "Patients",
        permissions: &[
            (Permission::PatientViewList, "View the patient list"),
            (Permission::PatientViewDetails, "View a patient's details"),
            (Permission::PatientCreate, "Register a new patient"),
            (Permission::PatientEdit, "Edit an existing patient"),
            (Permission::PatientDelete, "Delete a patient"),
            (Permission::PatientViewSensitive, "View sensitive data (e.g. tax id)"),
        ],
    },
    PermissionGroup {
        key: "appointments",
        label: "Schedule",
        permissions: &[
            (Permission::AppointmentViewList, "View the schedule"),
            (Permission::AppointmentViewOthers, "View other professionals' schedules"),
            (Permission::AppointmentCreate, "Book an appointment"),
            (Permission::AppointmentEdit, "Edit or reschedule an appointment"),
            (Permission::AppointmentDelete, "Cancel or delete an appointment"),
        ],
    },
    PermissionGroup {
        key: "logbook",
        label: "Logbook",
        permissions: &[
            (Permission::LogbookView, "View the visit logbook"),
            (Permission::LogbookCreate, "Create a logbook entry"),
            (Permission::LogbookEditOwn, "Edit own entries"),
            (Permission::LogbookEditAll, "Edit anyone's entries"),
            (Permission::LogbookDelete, "Delete entries"),
        ],
    },
    PermissionGroup {
        key: "guests",
        label: "Visitors",
        permissions: &[
            (Permission::GuestViewList, "View the visitor list"),
            (Permission::GuestCreate, "Register a new visitor"),
            (Permission::GuestEdit, "Edit a visitor"),
            (Permission::GuestDelete, "Remove a visitor record"),
        ],
    },
    PermissionGroup {
        key: "staff",
        label: "Staff",
        permissions: &[
            (Permission::StaffViewList, "View the staff list"),
            (Permission::StaffCreate, "Invite or create staff"),
            (Permission::StaffEditDetails, "Edit a staff profile"),
            (Permission::StaffEditRoles, "Assign or remove staff roles"),
            (Permission::StaffDeactivate, "Deactivate or reactivate a staff account"),
        ],
    },
    PermissionGroup {
        key: "finance",
        label: "Finance",
        permissions: &[
            (Permission::FinanceViewInvoices, "View invoices"),
            (Permission::FinanceManageInvoices, "Create and update invoices"),
            (Permission::FinanceViewExpenses, "View expenses"),
            (Permission::FinanceManageExpenses, "Record and update expenses"),
        ],
    },
    PermissionGroup {
        key: "admin",
        label: "Admin",
        permissions: &[
            (Permission::AdminAccessPanel, "General access to the admin panel"),
            (Permission::RbacViewRoles, "View the role list"),
            (Permission::RbacCreateRole, "Create a role"),
            (Permission::RbacEditRole, "Edit a role's name and permissions"),
            (Permission::RbacDeleteRole, "Delete a role"),
            (Permission::InstitutionEditSettings, "Edit institution settings"),
        ],
    },
];

/// The presentation group a permission belongs to.
pub fn group_of(permission: Permission) -> Option<&'static PermissionGroup> {
    PERMISSION_GROUPS
        .iter()
        .find(|group| group.permissions.iter().any(|(p, _)| *p == permission))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_permission() {
        let permission: Permission = "patient:create".parse().unwrap();
        assert_eq!(permission, Permission::PatientCreate);
        assert_eq!(permission.subject(), "patient");
        assert_eq!(permission.action(), "create");
    }

    #[test]
    fn test_parse_unknown_permission() {
        let err = "patient:teleport".parse::<Permission>().unwrap_err();
        assert_eq!(err, UnknownPermission("patient:teleport".to_string()));
    }

    #[test]
    fn test_string_forms_match_serde() {
        for permission in Permission::ALL {
            let json = serde_json::to_string(&permission).unwrap();
            assert_eq!(json, format!("\"{}\"", permission.as_str()));
            assert_eq!(permission.as_str().parse::<Permission>().unwrap(), permission);
        }
    }

    #[test]
    fn test_every_permission_has_exactly_one_group() {
        for permission in Permission::ALL {
            let count = PERMISSION_GROUPS
                .iter()
                .filter(|g| g.permissions.iter().any(|(p, _)| *p == permission))
                .count();
            assert_eq!(count, 1, "{} should be in exactly one group", permission);
        }
    }

    #[test]
    fn test_duplicate_grants_collapse() {
        let set: PermissionSet = [Permission::PatientCreate, Permission::PatientCreate].into();
        assert_eq!(set.len(), 1);
        assert!(set.contains(Permission::PatientCreate));
    }

    #[test]
    fn test_group_of() {
        assert_eq!(group_of(Permission::FinanceViewExpenses).unwrap().key, "finance");
        assert_eq!(group_of(Permission::RbacEditRole).unwrap().key, "admin");
    }
}
