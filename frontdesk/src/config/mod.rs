use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

use crate::authz::roles::StaffRole;

pub const SERVICE_DIR: &str = "frontdesk";

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub session: SessionSettings,
    pub login_rate_limit: RateLimitSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Mark the session cookie `Secure`; enable behind HTTPS.
    #[serde(default)]
    pub secure_cookies: bool,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

fn default_static_dir() -> String {
    "frontdesk/static".to_string()
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Hosted GoTrue + PostgREST.
    Supabase,
    /// Process-local accounts and tables, seeded from `demo_accounts`.
    Memory,
}

#[derive(Deserialize, Clone)]
pub struct BackendSettings {
    pub provider: BackendProvider,
    /// Project URL, e.g. `https://xyz.supabase.co`.
    #[serde(default)]
    pub url: String,
    /// Public anon key sent as the `apikey` header.
    pub anon_key: Secret<String>,
    #[serde(default)]
    pub demo_accounts: Vec<DemoAccount>,
}

impl BackendSettings {
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path)
    }
}

/// Account created at startup by the in-memory backend.
#[derive(Deserialize, Clone, Debug)]
pub struct DemoAccount {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<StaffRole>,
    #[serde(default)]
    pub is_owner: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SessionSettings {
    /// Bound on each profile or grant fetch.
    pub fetch_timeout_ms: u64,
    /// How long the route guard waits for a resolving session before
    /// answering with the loading page.
    pub guard_wait_ms: u64,
    /// Cookie inactivity expiry; session stores idle this long are evicted.
    pub idle_timeout_hours: i64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl SessionSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn guard_wait(&self) -> Duration {
        Duration::from_millis(self.guard_wait_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.idle_timeout_hours).unwrap_or(0) * 3600)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct RateLimitSettings {
    pub attempts: u32,
    pub window_seconds: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct TelemetrySettings {
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    service_core::config::load_settings(SERVICE_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_configuration_parses() {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../../config/base.yaml"),
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.backend.provider, BackendProvider::Memory);
        assert!(!settings.backend.demo_accounts.is_empty());
        assert_eq!(settings.session.fetch_timeout(), Duration::from_millis(5000));
        assert_eq!(settings.session.idle_timeout(), Duration::from_secs(12 * 3600));
        assert_eq!(settings.session.sweep_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let settings = BackendSettings {
            provider: BackendProvider::Supabase,
            url: "https://project.supabase.co/".to_string(),
            anon_key: Secret::new("anon".to_string()),
            demo_accounts: vec![],
        };
        assert_eq!(
            settings.endpoint("/rest/v1/profiles"),
            "https://project.supabase.co/rest/v1/profiles"
        );
    }
}
