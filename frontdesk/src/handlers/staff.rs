use askama::Template;
use axum::{
    Extension, Form,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use service_core::error::AppError;
use std::sync::Arc;
use validator::Validate;

use crate::AppState;
use crate::authz::guard::UNAUTHORIZED;
use crate::authz::permissions::Permission;
use crate::authz::policy::{Access, AuthorizationPolicy};
use crate::authz::roles::StaffRole;
use crate::middleware::guard::redirect;
use crate::models::{NewStaffForm, StaffContext};
use crate::services::{AuthError, SignUpAttributes};
use crate::session::ClientHandle;

pub struct RoleOption {
    pub key: &'static str,
    pub label: &'static str,
    pub permissions: Vec<&'static str>,
}

#[derive(Template)]
#[template(path = "staff.html")]
pub struct StaffTemplate {
    pub organization: Option<String>,
    pub roles: Vec<RoleOption>,
    pub error: Option<String>,
    pub created: Option<String>,
}

/// Roles the creator may hand out: assigning roles needs `staff:edit_roles`,
/// and only bundles the creator holds in full can be granted.
fn grantable_roles(state: &AppState, staff: &StaffContext) -> Vec<StaffRole> {
    if !state
        .policy
        .check(&staff.session, &Access::Permission(Permission::StaffEditRoles))
    {
        return Vec::new();
    }
    StaffRole::ALL
        .into_iter()
        .filter(|role| {
            state.policy.check(
                &staff.session,
                &Access::all(role.permissions().iter().copied()),
            )
        })
        .collect()
}

fn page(
    state: &AppState,
    staff: &StaffContext,
    error: Option<String>,
    created: Option<String>,
) -> StaffTemplate {
    StaffTemplate {
        organization: staff.profile.organization_name.clone(),
        roles: grantable_roles(state, staff)
            .into_iter()
            .map(|role| RoleOption {
                key: role.as_str(),
                label: role.label(),
                permissions: role.permissions().iter().map(|p| p.as_str()).collect(),
            })
            .collect(),
        error,
        created,
    }
}

pub async fn new_staff(State(state): State<AppState>, staff: StaffContext) -> StaffTemplate {
    page(&state, &staff, None, None)
}

/// Create an account in the creator's organization and grant it the
/// selected role bundles.
pub async fn create_staff(
    State(state): State<AppState>,
    Extension(client): Extension<Arc<ClientHandle>>,
    staff: StaffContext,
    headers: HeaderMap,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let form = NewStaffForm::from_pairs(pairs)
        .map_err(|e| AppError::BadRequest(anyhow::Error::new(e)))?;
    if let Err(errors) = form.validate() {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errors| errors.iter())
            .filter_map(|error| error.message.as_ref().map(|m| m.to_string()))
            .next()
            .unwrap_or_else(|| "Check the highlighted fields".to_string());
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            page(&state, &staff, Some(message), None),
        )
            .into_response());
    }

    let Some(organization_id) = staff.organization_id() else {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Staff member is not assigned to an organization"
        )));
    };
    let grantable = grantable_roles(&state, &staff);
    if !form.roles.iter().all(|role| grantable.contains(role)) {
        tracing::warn!(
            user_id = %staff.user_id(),
            roles = ?form.roles,
            "Refusing to grant roles beyond the creator's own"
        );
        return Ok(redirect(&headers, UNAUTHORIZED));
    }

    let identity = match client
        .store
        .sign_up(
            &form.email,
            &form.password,
            SignUpAttributes {
                name: form.name.clone(),
                organization_id: Some(organization_id),
            },
        )
        .await
    {
        Ok(identity) => identity,
        Err(AuthError::Network(e)) => {
            tracing::error!(error = %e, "Auth backend unreachable while creating staff");
            return Err(AppError::BadGateway(e));
        }
        Err(e) => {
            tracing::warn!(error = %e, "Staff sign-up rejected");
            return Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                page(&state, &staff, Some(e.user_message().to_string()), None),
            )
                .into_response());
        }
    };

    client
        .directory
        .upsert_profile(&form.profile(&identity, &staff.profile))
        .await?;
    client
        .directory
        .grant_permissions(form.grants(&identity, organization_id))
        .await?;
    tracing::info!(
        user_id = %identity.id,
        created_by = %staff.user_id(),
        roles = ?form.roles,
        "Staff member created"
    );

    Ok((
        StatusCode::CREATED,
        page(&state, &staff, None, Some(identity.email)),
    )
        .into_response())
}
