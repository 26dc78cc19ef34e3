//! Identity, profile and permission-grant records.
//!
//! Rows coming back from the hosted backend are deserialized into `*Row`
//! types first and only become domain records after validation, so a shape
//! mismatch is reported at the boundary instead of leaking into the session.

use crate::authz::permissions::{Permission, UnknownPermission};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Identifier of an authenticated principal (the backend's `auth.users.id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The externally-authenticated principal behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
}

/// Organization-scoped descriptive record attached to an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub organization_id: Option<Uuid>,
    pub organization_name: Option<String>,
    pub is_owner: bool,
}

impl Profile {
    /// Up to two uppercase initials, for avatars.
    pub fn initials(&self) -> String {
        let initials: String = self
            .name
            .split_whitespace()
            .filter_map(|part| part.chars().next())
            .take(2)
            .collect::<String>()
            .to_uppercase();

        if initials.is_empty() {
            "U".to_string()
        } else {
            initials
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationRef {
    pub name: String,
}

/// `profiles` row as selected with its organization joined.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileRow {
    pub id: Uuid,
    #[validate(length(min = 1, message = "profile name must not be empty"))]
    pub name: String,
    #[validate(email(message = "profile email is not a valid address"))]
    pub email: String,
    pub organization_id: Option<Uuid>,
    pub is_owner: Option<bool>,
    #[serde(default, rename = "organizations")]
    pub organization: Option<OrganizationRef>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("invalid record: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error(transparent)]
    UnknownPermission(#[from] UnknownPermission),
}

impl TryFrom<ProfileRow> for Profile {
    type Error = RecordError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        row.validate()?;
        Ok(Profile {
            id: UserId(row.id),
            name: row.name,
            email: row.email,
            organization_id: row.organization_id,
            organization_name: row.organization.map(|org| org.name),
            is_owner: row.is_owner.unwrap_or(false),
        })
    }
}

/// A fact that a user holds a named permission within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionGrant {
    pub user_id: UserId,
    pub organization_id: Option<Uuid>,
    pub permission: Permission,
}

/// `staff_permissions` row.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionGrantRow {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub permission: String,
}

impl TryFrom<PermissionGrantRow> for PermissionGrant {
    type Error = RecordError;

    fn try_from(row: PermissionGrantRow) -> Result<Self, Self::Error> {
        Ok(PermissionGrant {
            user_id: UserId(row.user_id),
            organization_id: row.organization_id,
            permission: row.permission.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_row_with_joined_organization() {
        let id = Uuid::new_v4();
        let org = Uuid::new_v4();
        let row: ProfileRow = serde_json::from_value(json!({
            "id": id,
            "name": "Maria Silva",
            "email": "maria@clinic.test",
            "organization_id": org,
            "is_owner": null,
            "organizations": { "name": "Clinica Sol" }
        }))
        .unwrap();

        let profile = Profile::try_from(row).unwrap();
        assert_eq!(profile.id, UserId::from(id));
        assert_eq!(profile.organization_name.as_deref(), Some("Clinica Sol"));
        assert!(!profile.is_owner);
        assert_eq!(profile.initials(), "MS");
    }

    #[test]
    fn test_profile_row_missing_field_is_rejected() {
        let result = serde_json::from_value::<ProfileRow>(json!({
            "id": Uuid::new_v4(),
            "email": "maria@clinic.test"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_profile_row_with_bad_email_is_rejected() {
        let row: ProfileRow = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "name": "Maria",
            "email": "not-an-email",
            "organization_id": null,
            "is_owner": true
        }))
        .unwrap();
        assert!(matches!(Profile::try_from(row), Err(RecordError::Invalid(_))));
    }

    #[test]
    fn test_grant_row_with_unknown_permission() {
        let row = PermissionGrantRow {
            user_id: Uuid::new_v4(),
            organization_id: None,
            permission: "billing:launch_rockets".to_string(),
        };
        assert!(matches!(
            PermissionGrant::try_from(row),
            Err(RecordError::UnknownPermission(_))
        ));
    }

    #[test]
    fn test_initials_fallback() {
        let profile = Profile {
            id: UserId::new(),
            name: "   ".to_string(),
            email: "x@y.test".to_string(),
            organization_id: None,
            organization_name: None,
            is_owner: false,
        };
        assert_eq!(profile.initials(), "U");
    }
}
