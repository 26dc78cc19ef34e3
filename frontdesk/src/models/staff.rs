use uuid::Uuid;
use validator::Validate;

use super::profile::{Identity, PermissionGrant, Profile};
use crate::authz::permissions::PermissionSet;
use crate::authz::roles::{StaffRole, UnknownRole};

/// Staff creation form, built from urlencoded pairs so `roles` may repeat
/// once per checked role.
#[derive(Clone, Default, Validate)]
pub struct NewStaffForm {
    #[validate(length(min = 2, max = 100, message = "Name must be 2 to 100 characters"))]
    pub name: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "Select at least one role"))]
    pub roles: Vec<StaffRole>,
}

impl NewStaffForm {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self, UnknownRole> {
        let mut form = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "name" => form.name = value.trim().to_string(),
                "email" => form.email = value.trim().to_string(),
                "password" => form.password = value,
                "roles" => {
                    let role = value.parse::<StaffRole>()?;
                    if !form.roles.contains(&role) {
                        form.roles.push(role);
                    }
                }
                _ => {}
            }
        }
        Ok(form)
    }

    /// Union of the selected role bundles.
    pub fn permissions(&self) -> PermissionSet {
        self.roles
            .iter()
            .flat_map(|role| role.permissions().iter().copied())
            .collect()
    }

    /// Profile for the new account, placed in the creator's organization.
    pub fn profile(&self, identity: &Identity, organization: &Profile) -> Profile {
        Profile {
            id: identity.id,
            name: self.name.clone(),
            email: identity.email.clone(),
            organization_id: organization.organization_id,
            organization_name: organization.organization_name.clone(),
            is_owner: false,
        }
    }

    /// One grant row per permission, scoped to `organization_id`.
    pub fn grants(&self, identity: &Identity, organization_id: Uuid) -> Vec<PermissionGrant> {
        self.permissions()
            .iter()
            .map(|permission| PermissionGrant {
                user_id: identity.id,
                organization_id: Some(organization_id),
                permission,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::permissions::Permission;
    use crate::models::UserId;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_repeated_roles_are_collected() {
        let form = NewStaffForm::from_pairs(pairs(&[
            ("name", " Nina Nurse "),
            ("email", "nina@clinic.test"),
            ("password", "secret1"),
            ("roles", "THERAPIST"),
            ("roles", "receptionist"),
            ("roles", "THERAPIST"),
        ]))
        .unwrap();

        assert_eq!(form.name, "Nina Nurse");
        assert_eq!(form.roles, vec![StaffRole::Therapist, StaffRole::Receptionist]);
        assert!(form.validate().is_ok());
        assert!(form.permissions().contains(Permission::AppointmentEdit));
        assert!(form.permissions().contains(Permission::GuestCreate));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert!(NewStaffForm::from_pairs(pairs(&[("roles", "JANITOR")])).is_err());
    }

    #[test]
    fn test_form_needs_a_role_and_a_real_password() {
        let form = NewStaffForm::from_pairs(pairs(&[
            ("name", "Nina Nurse"),
            ("email", "nina@clinic.test"),
            ("password", "123"),
        ]))
        .unwrap();

        let errors = form.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("roles"));
    }

    #[test]
    fn test_grants_are_scoped_to_the_organization() {
        let form = NewStaffForm {
            roles: vec![StaffRole::Finance],
            ..Default::default()
        };
        let identity = Identity {
            id: UserId::new(),
            email: "fabio@clinic.test".to_string(),
        };
        let organization = Uuid::new_v4();

        let grants = form.grants(&identity, organization);
        assert_eq!(grants.len(), StaffRole::Finance.permissions().len());
        assert!(grants.iter().all(|grant| grant.organization_id == Some(organization)));
        assert!(grants.iter().all(|grant| grant.user_id == identity.id));
    }
}
