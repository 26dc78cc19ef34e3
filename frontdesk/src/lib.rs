pub mod authz;
pub mod config;
pub mod dashboard;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod session;
pub mod startup;
pub mod utils;

use authz::policy::{AuthorizationPolicy, OwnerBypassPolicy};
use config::{RateLimitSettings, SessionSettings};
use service_core::middleware::rate_limit::{IpRateLimiter, create_ip_rate_limiter};
use session::{BackendFactory, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub policy: Arc<dyn AuthorizationPolicy>,
    /// Upper bound the route guard waits for a resolving session.
    pub guard_wait: Duration,
    pub login_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        session: &SessionSettings,
        login_rate_limit: &RateLimitSettings,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(factory, session.fetch_timeout())),
            policy: Arc::new(OwnerBypassPolicy),
            guard_wait: session.guard_wait(),
            login_limiter: create_ip_rate_limiter(
                login_rate_limit.attempts,
                login_rate_limit.window_seconds,
            ),
        }
    }
}
