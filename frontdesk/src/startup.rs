use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use service_core::middleware::{
    rate_limit::ip_rate_limit_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use time::Duration;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::AppState;
use crate::authz::permissions::Permission;
use crate::authz::policy::Access;
use crate::config::{BackendProvider, Settings};
use crate::handlers::{
    app::{health_check, index, unauthorized},
    auth::{auth_page, sign_in, sign_out},
    dashboard::{dashboard, switch_view},
    logbook::{check_in, check_out, logbook},
    metrics::metrics,
    session::current_session,
    staff::{create_staff, new_staff},
};
use crate::middleware::{guard::require_access, metrics::http_metrics_middleware};
use crate::services::memory::MemoryFactory;
use crate::services::supabase::SupabaseFactory;
use crate::session::BackendFactory;

/// Cookie and router options that do not live in [`AppState`].
#[derive(Clone, Debug)]
pub struct RouterOptions {
    pub secure_cookies: bool,
    pub idle_timeout_hours: i64,
    pub static_dir: String,
}

impl From<&Settings> for RouterOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            secure_cookies: settings.server.secure_cookies,
            idle_timeout_hours: settings.session.idle_timeout_hours,
            static_dir: settings.server.static_dir.clone(),
        }
    }
}

/// Pick the backend collaborators named in the configuration.
pub fn build_factory(settings: &Settings) -> anyhow::Result<Arc<dyn BackendFactory>> {
    Ok(match settings.backend.provider {
        BackendProvider::Supabase => Arc::new(SupabaseFactory::new(settings.backend.clone())),
        BackendProvider::Memory => {
            Arc::new(MemoryFactory::seeded(&settings.backend.demo_accounts)?)
        }
    })
}

fn guarded(state: &AppState, access: Access, routes: Router<AppState>) -> Router<AppState> {
    routes.route_layer(from_fn_with_state((state.clone(), access), require_access))
}

pub fn build_router(state: AppState, options: &RouterOptions) -> Router {
    // Session setup
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(options.secure_cookies)
        .with_expiry(Expiry::OnInactivity(Duration::hours(
            options.idle_timeout_hours,
        )));

    let sign_in_route = post(sign_in).route_layer(from_fn_with_state(
        state.login_limiter.clone(),
        ip_rate_limit_middleware,
    ));

    let staff_routes = guarded(
        &state,
        Access::Authenticated,
        Router::new()
            .route("/dashboard", get(dashboard))
            .route("/dashboard/view", post(switch_view)),
    );
    let logbook_routes = guarded(
        &state,
        Access::Permission(Permission::LogbookView),
        Router::new().route("/logbook", get(logbook)),
    );
    let check_in_routes = guarded(
        &state,
        Access::Permission(Permission::LogbookCreate),
        Router::new().route("/logbook/check-in", post(check_in)),
    );
    let check_out_routes = guarded(
        &state,
        Access::any([Permission::LogbookEditOwn, Permission::LogbookEditAll]),
        Router::new().route("/logbook/:id/check-out", post(check_out)),
    );
    let staff_admin_routes = guarded(
        &state,
        Access::Permission(Permission::StaffCreate),
        Router::new()
            .route("/staff/new", get(new_staff))
            .route("/staff", post(create_staff)),
    );

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/auth", get(auth_page).merge(sign_in_route))
        .route("/auth/sign-out", get(sign_out).post(sign_out))
        .route("/unauthorized", get(unauthorized))
        .route("/api/session", get(current_session))
        .merge(staff_routes)
        .merge(logbook_routes)
        .merge(check_in_routes)
        .merge(check_out_routes)
        .merge(staff_admin_routes)
        .nest_service("/static", ServeDir::new(&options.static_dir))
        .layer(session_layer)
        .layer(from_fn(http_metrics_middleware))
        .layer(from_fn(security_headers_middleware))
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
