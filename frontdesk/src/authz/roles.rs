//! Staff roles as named permission bundles.
//!
//! Roles are not a second authorization scheme: holding a role means holding
//! every permission in its bundle, so role checks reduce to permission
//! checks and organization owners hold every role.

use super::permissions::Permission;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    Admin,
    Finance,
    Coordinator,
    Therapist,
    Receptionist,
}

const ADMIN: &[Permission] = &Permission::ALL;

const FINANCE: &[Permission] = &[
    Permission::FinanceViewInvoices,
    Permission::FinanceManageInvoices,
    Permission::FinanceViewExpenses,
    Permission::FinanceManageExpenses,
    Permission::PatientViewList,
];

const COORDINATOR: &[Permission] = &[
    Permission::PatientViewList,
    Permission::PatientViewDetails,
    Permission::AppointmentViewList,
    Permission::AppointmentViewOthers,
    Permission::AppointmentCreate,
    Permission::AppointmentEdit,
    Permission::AppointmentDelete,
    Permission::LogbookView,
];

const THERAPIST: &[Permission] = &[
    Permission::PatientViewList,
    Permission::PatientViewDetails,
    Permission::AppointmentViewList,
    Permission::AppointmentCreate,
    Permission::AppointmentEdit,
    Permission::LogbookView,
    Permission::LogbookCreate,
];

const RECEPTIONIST: &[Permission] = &[
    Permission::PatientViewList,
    Permission::PatientViewDetails,
    Permission::PatientCreate,
    Permission::AppointmentViewList,
    Permission::AppointmentCreate,
    Permission::GuestViewList,
    Permission::GuestCreate,
    Permission::LogbookView,
    Permission::LogbookCreate,
    Permission::LogbookEditOwn,
];

impl StaffRole {
    pub const ALL: [StaffRole; 5] = [
        StaffRole::Admin,
        StaffRole::Finance,
        StaffRole::Coordinator,
        StaffRole::Therapist,
        StaffRole::Receptionist,
    ];

    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            StaffRole::Admin => ADMIN,
            StaffRole::Finance => FINANCE,
            StaffRole::Coordinator => COORDINATOR,
            StaffRole::Therapist => THERAPIST,
            StaffRole::Receptionist => RECEPTIONIST,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Admin => "ADMIN",
            StaffRole::Finance => "FINANCE",
            StaffRole::Coordinator => "COORDINATOR",
            StaffRole::Therapist => "THERAPIST",
            StaffRole::Receptionist => "RECEPTIONIST",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StaffRole::Admin => "Administrator",
            StaffRole::Finance => "Finance",
            StaffRole::Coordinator => "Coordinator",
            StaffRole::Therapist => "Therapist",
            StaffRole::Receptionist => "Receptionist",
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown staff role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for StaffRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StaffRole::ALL
            .iter()
            .copied()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}
