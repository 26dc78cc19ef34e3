use axum::{Json, extract::State};
use serde::Serialize;
use service_core::error::AppError;
use tower_sessions::Session as CookieSession;

use crate::AppState;
use crate::dashboard::{DashboardRouter, DashboardView};
use crate::session::Session;

#[derive(Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: Session,
    pub is_authenticated: bool,
    pub menu: Vec<DashboardView>,
}

/// Current session snapshot. Never waits for a resolution in flight.
pub async fn current_session(
    State(state): State<AppState>,
    cookie: CookieSession,
) -> Result<Json<SessionResponse>, AppError> {
    let session = match state.registry.for_cookie(&cookie).await? {
        Some(client) => client.store.get_session(),
        None => Session::anonymous(),
    };
    let menu = if session.is_authenticated() {
        DashboardRouter::new(state.policy.as_ref()).menu(&session)
    } else {
        Vec::new()
    };

    Ok(Json(SessionResponse {
        is_authenticated: session.is_authenticated(),
        menu,
        session,
    }))
}
