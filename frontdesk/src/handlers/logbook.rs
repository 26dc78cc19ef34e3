use askama::Template;
use axum::{
    Extension, Form,
    extract::Path,
    http::HeaderMap,
    response::Response,
};
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::authz::gate::PermissionGate;
use crate::authz::guard::UNAUTHORIZED;
use crate::authz::permissions::Permission;
use crate::middleware::guard::redirect;
use crate::models::{CheckInForm, EntryKind, LogbookEntry, NewLogbookEntry, PersonType, StaffContext};
use crate::session::{ClientHandle, Session};

const LOGBOOK: &str = "/logbook";

pub struct EntryRow {
    pub id: String,
    pub kind: &'static str,
    pub person_type: &'static str,
    pub person_name: String,
    pub purpose: String,
    pub time: String,
    pub active: bool,
    pub can_check_out: bool,
}

#[derive(Template)]
#[template(path = "logbook.html")]
pub struct LogbookTemplate {
    pub organization: Option<String>,
    pub can_check_in: bool,
    pub entries: Vec<EntryRow>,
}

/// Staff may close their own entries with `logbook:edit_own`, anyone's with
/// `logbook:edit_all`.
fn can_check_out(session: &Session, entry: &LogbookEntry, staff: &StaffContext) -> bool {
    PermissionGate::single(Permission::LogbookEditAll).allows(session)
        || (PermissionGate::single(Permission::LogbookEditOwn).allows(session)
            && entry.staff_id == Some(staff.user_id()))
}

fn row(entry: &LogbookEntry, staff: &StaffContext) -> EntryRow {
    EntryRow {
        id: entry.id.to_string(),
        kind: match entry.kind {
            EntryKind::CheckIn => "Check-in",
            EntryKind::CheckOut => "Check-out",
        },
        person_type: match entry.person_type {
            PersonType::Patient => "Patient",
            PersonType::Guest => "Guest",
        },
        person_name: entry.person_name.clone(),
        purpose: entry.purpose.clone().unwrap_or_default(),
        time: entry.timestamp.format("%Y-%m-%d %H:%M").to_string(),
        active: entry.kind == EntryKind::CheckIn && entry.is_active(),
        can_check_out: can_check_out(&staff.session, entry, staff),
    }
}

/// Staff outside any organization have no logbook.
fn organization(staff: &StaffContext) -> Result<Uuid, AppError> {
    staff.organization_id().ok_or_else(|| {
        AppError::Forbidden(anyhow::anyhow!(
            "Staff member is not assigned to an organization"
        ))
    })
}

pub async fn logbook(
    Extension(client): Extension<Arc<ClientHandle>>,
    staff: StaffContext,
) -> Result<LogbookTemplate, AppError> {
    let entries = match staff.organization_id() {
        Some(organization_id) => client.logbook.list_entries(organization_id).await?,
        None => Vec::new(),
    };

    Ok(LogbookTemplate {
        organization: staff.profile.organization_name.clone(),
        can_check_in: staff.organization_id().is_some()
            && PermissionGate::single(Permission::LogbookCreate).allows(&staff.session),
        entries: entries.iter().map(|entry| row(entry, &staff)).collect(),
    })
}

pub async fn check_in(
    Extension(client): Extension<Arc<ClientHandle>>,
    staff: StaffContext,
    headers: HeaderMap,
    Form(form): Form<CheckInForm>,
) -> Result<Response, AppError> {
    form.validate()?;
    let organization_id = organization(&staff)?;

    let entry = client
        .logbook
        .record_entry(NewLogbookEntry::check_in(
            form,
            staff.user_id(),
            organization_id,
        ))
        .await?;
    tracing::info!(entry_id = %entry.id, user_id = %staff.user_id(), "Visitor checked in");

    Ok(redirect(&headers, LOGBOOK))
}

pub async fn check_out(
    Extension(client): Extension<Arc<ClientHandle>>,
    staff: StaffContext,
    headers: HeaderMap,
    Path(entry_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let entry = client.logbook.get_entry(entry_id).await?;
    match (entry.organization_id, staff.organization_id()) {
        (Some(entry_org), Some(staff_org)) if entry_org == staff_org => {}
        _ => return Err(AppError::NotFound(anyhow::anyhow!("Logbook entry not found"))),
    }
    if !can_check_out(&staff.session, &entry, &staff) {
        return Ok(redirect(&headers, UNAUTHORIZED));
    }
    if !entry.is_active() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Entry is already checked out"
        )));
    }

    // a check-out row only exists for an entry this request completed
    let completed = client.logbook.complete_entry(entry.id).await.map_err(|e| {
        tracing::warn!(entry_id = %entry.id, error = %e, "Failed to complete logbook entry");
        AppError::from(e)
    })?;
    client
        .logbook
        .record_entry(NewLogbookEntry::check_out(&completed, staff.user_id()))
        .await?;
    tracing::info!(entry_id = %entry.id, user_id = %staff.user_id(), "Visitor checked out");

    Ok(redirect(&headers, LOGBOOK))
}
