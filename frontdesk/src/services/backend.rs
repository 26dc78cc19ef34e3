//! Tabular backend collaborators: the staff directory (profiles and
//! permission grants) and the visit logbook.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::authz::permissions::PermissionSet;
use crate::models::profile::RecordError;
use crate::models::{LogbookEntry, NewLogbookEntry, PermissionGrant, Profile, UserId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Network(String),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected record shape: {0}")]
    Shape(String),

    #[error("Record not found")]
    NotFound,

    #[error("Record is no longer {0}")]
    Conflict(&'static str),

    #[error("Backend request timed out")]
    Timeout,
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_decode() {
            BackendError::Shape(e.to_string())
        } else {
            BackendError::Network(e.to_string())
        }
    }
}

impl From<RecordError> for BackendError {
    fn from(e: RecordError) -> Self {
        BackendError::Shape(e.to_string())
    }
}

impl From<BackendError> for service_core::error::AppError {
    fn from(e: BackendError) -> Self {
        use service_core::error::AppError;
        match e {
            BackendError::NotFound => AppError::NotFound(anyhow::anyhow!("Record not found")),
            BackendError::Conflict(_) => AppError::BadRequest(anyhow::anyhow!(e.to_string())),
            BackendError::Timeout => AppError::GatewayTimeout(e.to_string()),
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn fetch_profile(&self, user_id: UserId) -> Result<Profile, BackendError>;

    async fn fetch_permission_grants(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PermissionGrant>, BackendError>;

    /// Create or update a profile row, keyed by its id.
    async fn upsert_profile(&self, profile: &Profile) -> Result<(), BackendError>;

    /// Insert grant rows for a newly created staff member.
    async fn grant_permissions(&self, grants: Vec<PermissionGrant>) -> Result<(), BackendError>;
}

#[async_trait]
pub trait LogbookRepository: Send + Sync {
    /// Entries for an organization, newest first. Rows without an
    /// organization are never listed.
    async fn list_entries(&self, organization_id: Uuid) -> Result<Vec<LogbookEntry>, BackendError>;

    async fn get_entry(&self, entry_id: Uuid) -> Result<LogbookEntry, BackendError>;

    async fn record_entry(&self, entry: NewLogbookEntry) -> Result<LogbookEntry, BackendError>;

    /// Mark an active entry completed. Fails with [`BackendError::Conflict`]
    /// when the entry is not active anymore, so only one caller wins.
    async fn complete_entry(&self, entry_id: Uuid) -> Result<LogbookEntry, BackendError>;
}

/// Collapse grant rows into a set. Grants for another user are a shape
/// error; duplicates collapse.
pub fn collapse_grants(
    user_id: UserId,
    grants: impl IntoIterator<Item = PermissionGrant>,
) -> Result<PermissionSet, BackendError> {
    grants
        .into_iter()
        .map(|grant| {
            if grant.user_id == user_id {
                Ok(grant.permission)
            } else {
                Err(BackendError::Shape(format!(
                    "grant for {} returned while resolving {}",
                    grant.user_id, user_id
                )))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::permissions::Permission;

    fn grant(user_id: UserId, permission: Permission) -> PermissionGrant {
        PermissionGrant {
            user_id,
            organization_id: None,
            permission,
        }
    }

    #[test]
    fn test_duplicate_grants_collapse() {
        let user = UserId::new();
        let set = collapse_grants(
            user,
            vec![
                grant(user, Permission::PatientViewList),
                grant(user, Permission::PatientViewList),
                grant(user, Permission::GuestCreate),
            ],
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(Permission::PatientViewList));
    }

    #[test]
    fn test_foreign_grant_is_shape_error() {
        let user = UserId::new();
        let result = collapse_grants(user, vec![grant(UserId::new(), Permission::LogbookView)]);
        assert!(matches!(result, Err(BackendError::Shape(_))));
    }

    #[test]
    fn test_maps_to_app_error() {
        use axum::http::StatusCode;
        use service_core::error::AppError;

        assert_eq!(
            AppError::from(BackendError::Timeout).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::from(BackendError::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(BackendError::Conflict("active")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(BackendError::Network("refused".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
