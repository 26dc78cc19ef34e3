use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use uuid::Uuid;

use super::profile::{Identity, Profile, UserId};
use crate::authz::guard::AUTH_ENTRY;
use crate::authz::permissions::PermissionSet;
use crate::session::Session;

/// Signed-in staff member, available to handlers behind the route guard.
///
/// The guard places the session snapshot it authorized into the request
/// extensions; this extractor only reads it back.
#[derive(Debug, Clone)]
pub struct StaffContext {
    pub identity: Identity,
    pub profile: Profile,
    pub session: Session,
}

impl StaffContext {
    pub fn user_id(&self) -> UserId {
        self.identity.id
    }

    pub fn organization_id(&self) -> Option<Uuid> {
        self.profile.organization_id
    }

    pub fn permissions(&self) -> &PermissionSet {
        self.session.permissions()
    }

    pub fn display_name(&self) -> &str {
        if self.profile.name.is_empty() {
            self.identity.email.split('@').next().unwrap_or("Staff")
        } else {
            &self.profile.name
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for StaffContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .filter(|session| session.is_authenticated())
            .cloned();

        match session {
            Some(session) => match (session.identity().cloned(), session.profile().cloned()) {
                (Some(identity), Some(profile)) => Ok(StaffContext {
                    identity,
                    profile,
                    session,
                }),
                _ => Err(Redirect::to(AUTH_ENTRY).into_response()),
            },
            None => Err(Redirect::to(AUTH_ENTRY).into_response()),
        }
    }
}
