pub mod guard;
pub mod metrics;

pub use guard::require_access;
pub use metrics::http_metrics_middleware;
