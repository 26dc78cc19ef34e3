pub mod auth;
pub mod backend;
pub mod memory;
pub mod metrics;
pub mod supabase;

pub use auth::{AuthError, AuthEvent, AuthProvider, AuthSession, AuthTokens, SignUpAttributes};
pub use backend::{BackendError, Directory, LogbookRepository};
