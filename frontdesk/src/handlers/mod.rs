pub mod app;
pub mod auth;
pub mod dashboard;
pub mod logbook;
pub mod metrics;
pub mod session;
pub mod staff;

use service_core::error::AppError;

pub(crate) fn cookie_error(e: tower_sessions::session::Error) -> AppError {
    AppError::InternalError(anyhow::Error::new(e))
}
