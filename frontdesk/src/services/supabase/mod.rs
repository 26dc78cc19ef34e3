//! Hosted backend clients: GoTrue for authentication, PostgREST for tables.

pub mod auth;
pub mod rest;

pub use auth::SupabaseAuth;
pub use rest::SupabaseBackend;

use reqwest::Client;
use secrecy::ExposeSecret;
use std::sync::Arc;

use crate::config::BackendSettings;
use crate::services::auth::AuthTokens;
use crate::session::registry::{Backend, BackendFactory};

pub(crate) const APIKEY_HEADER: &str = "apikey";

/// Builds one GoTrue session and one PostgREST client per browser, sharing
/// a single connection pool.
pub struct SupabaseFactory {
    client: Client,
    settings: BackendSettings,
}

impl SupabaseFactory {
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }
}

impl BackendFactory for SupabaseFactory {
    fn create(&self, tokens: Option<AuthTokens>) -> Backend {
        let auth = Arc::new(SupabaseAuth::restore(
            self.client.clone(),
            self.settings.clone(),
            tokens,
        ));
        let backend = Arc::new(SupabaseBackend::new(
            self.client.clone(),
            self.settings.clone(),
            auth.clone(),
        ));
        Backend {
            auth,
            directory: backend.clone(),
            logbook: backend,
        }
    }
}

pub(crate) fn anon_key(settings: &BackendSettings) -> &str {
    settings.anon_key.expose_secret()
}
