//! Route guard middleware.
//!
//! Resolves the browser's session store, waits briefly for it to settle and
//! applies [`RouteGuard`]. It never starts a profile fetch of its own.

use askama::Template;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session as CookieSession;

use crate::AppState;
use crate::authz::guard::{GuardDecision, RouteGuard};
use crate::authz::policy::Access;
use crate::services::metrics::record_guard_decision;
use crate::session::Session;
use service_core::error::AppError;

/// Seconds before the loading page asks the browser to retry.
const LOADING_RETRY_SECONDS: &str = "1";

#[derive(Template)]
#[template(path = "loading.html")]
pub struct LoadingTemplate {
    pub path: String,
}

pub async fn require_access(
    State((state, access)): State<(AppState, Access)>,
    cookie: CookieSession,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = state.registry.for_cookie(&cookie).await?;
    let session = match &client {
        Some(client) => client.store.settled(state.guard_wait).await,
        None => Session::anonymous(),
    };

    let decision = RouteGuard::new(state.policy.as_ref()).evaluate(&session, &access);
    record_guard_decision(decision.label());

    match decision {
        GuardDecision::Loading => {
            tracing::debug!(path = %request.uri().path(), "Session still resolving");
            Ok(loading(request.uri().path()))
        }
        GuardDecision::Redirect(target) => {
            tracing::info!(
                path = %request.uri().path(),
                target,
                user_id = ?session.identity_id(),
                "Route guard redirect"
            );
            Ok(redirect(request.headers(), target))
        }
        GuardDecision::Authorized => {
            if let Some(client) = client {
                if let Err(e) = state.registry.persist_tokens(&cookie, &client).await {
                    tracing::warn!(error = %e, "Failed to persist rotated tokens");
                }
                request.extensions_mut().insert(client);
            }
            request.extensions_mut().insert(session);
            Ok(next.run(request).await)
        }
    }
}

fn loading(path: &str) -> Response {
    let mut response = LoadingTemplate {
        path: path.to_string(),
    }
    .into_response();
    response
        .headers_mut()
        .insert("refresh", HeaderValue::from_static(LOADING_RETRY_SECONDS));
    response
}

/// Plain redirect, or an `HX-Redirect` for htmx-driven requests.
pub fn redirect(headers: &HeaderMap, target: &'static str) -> Response {
    if headers.contains_key("hx-request") {
        let mut response = StatusCode::OK.into_response();
        response
            .headers_mut()
            .insert("HX-Redirect", HeaderValue::from_static(target));
        response
    } else {
        Redirect::to(target).into_response()
    }
}
