use askama::Template;
use axum::{
    Form,
    extract::State,
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use service_core::error::AppError;
use tower_sessions::Session as CookieSession;

use super::cookie_error;
use crate::AppState;
use crate::dashboard::{ACTIVE_VIEW_KEY, DashboardRouter, DashboardView};
use crate::middleware::guard::redirect;
use crate::models::StaffContext;

pub struct MenuItem {
    pub key: &'static str,
    pub label: &'static str,
    pub active: bool,
}

pub struct PanelLink {
    pub label: &'static str,
    pub href: Option<&'static str>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub name: String,
    pub initials: String,
    pub organization: Option<String>,
    pub is_owner: bool,
    pub menu: Vec<MenuItem>,
    pub title: Option<&'static str>,
    pub links: Vec<PanelLink>,
}

#[derive(Deserialize)]
pub struct SwitchViewForm {
    pub view: String,
}

pub async fn dashboard(
    State(state): State<AppState>,
    cookie: CookieSession,
    staff: StaffContext,
) -> Result<DashboardTemplate, AppError> {
    let remembered = cookie
        .get::<DashboardView>(ACTIVE_VIEW_KEY)
        .await
        .map_err(cookie_error)?;
    let router = DashboardRouter::new(state.policy.as_ref());
    let active = router.active_view(&staff.session, remembered);

    let menu = router
        .menu(&staff.session)
        .into_iter()
        .map(|view| MenuItem {
            key: view.as_str(),
            label: view.label(),
            active: Some(view) == active,
        })
        .collect();

    let links = active
        .map(|view| {
            view.actions()
                .into_iter()
                .filter_map(|action| {
                    action.gate.show(
                        &staff.session,
                        PanelLink {
                            label: action.label,
                            href: action.href,
                        },
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(DashboardTemplate {
        name: staff.display_name().to_string(),
        initials: staff.profile.initials(),
        organization: staff.profile.organization_name.clone(),
        is_owner: staff.session.is_owner(),
        menu,
        title: active.map(|view| view.label()),
        links,
    })
}

pub async fn switch_view(
    State(state): State<AppState>,
    cookie: CookieSession,
    headers: HeaderMap,
    staff: StaffContext,
    Form(form): Form<SwitchViewForm>,
) -> Result<Response, AppError> {
    let requested: DashboardView = form
        .view
        .parse()
        .map_err(|e| AppError::BadRequest(anyhow::Error::new(e)))?;

    match DashboardRouter::new(state.policy.as_ref()).switch_to(&staff.session, requested) {
        Some(view) => {
            cookie
                .insert(ACTIVE_VIEW_KEY, view)
                .await
                .map_err(cookie_error)?;
            tracing::debug!(user_id = %staff.user_id(), view = %view, "Dashboard view switched");
        }
        None => {
            tracing::info!(
                user_id = %staff.user_id(),
                view = %requested,
                "Ignoring switch to a view outside the menu"
            );
        }
    }
    Ok(redirect(&headers, "/dashboard"))
}
