//! Shared setup for frontdesk integration tests.
//!
//! Builds the full router over the in-memory backend and offers a tiny
//! cookie-carrying client on top of `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, header},
    response::Response,
};
use frontdesk::AppState;
use frontdesk::authz::permissions::PermissionSet;
use frontdesk::config::{RateLimitSettings, SessionSettings};
use frontdesk::models::{Identity, Profile};
use frontdesk::services::memory::{MemoryAccounts, MemoryDirectory, MemoryFactory};
use frontdesk::startup::{RouterOptions, build_router};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "correct-horse";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub accounts: Arc<MemoryAccounts>,
    pub directory: Arc<MemoryDirectory>,
    pub organization_id: Uuid,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(
            SessionSettings {
                fetch_timeout_ms: 2_000,
                guard_wait_ms: 1_000,
                idle_timeout_hours: 1,
                sweep_interval_secs: 60,
            },
            RateLimitSettings {
                attempts: 1_000,
                window_seconds: 60,
            },
        )
    }

    pub fn with_settings(session: SessionSettings, login_rate_limit: RateLimitSettings) -> Self {
        let accounts = MemoryAccounts::new();
        let directory = MemoryDirectory::new();
        let factory = Arc::new(MemoryFactory::new(accounts.clone(), directory.clone()));
        let state = AppState::new(factory, &session, &login_rate_limit);
        let router = build_router(
            state.clone(),
            &RouterOptions {
                secure_cookies: false,
                idle_timeout_hours: session.idle_timeout_hours,
                static_dir: "static".to_string(),
            },
        );

        Self {
            router,
            state,
            accounts,
            directory,
            organization_id: Uuid::new_v4(),
        }
    }

    /// Register an account with a profile and grants in the test organization.
    pub fn add_staff(&self, email: &str, permissions: PermissionSet, is_owner: bool) -> Identity {
        self.add_staff_in(Some(self.organization_id), email, permissions, is_owner)
    }

    /// Like [`Self::add_staff`], in `organization_id` (or none at all).
    pub fn add_staff_in(
        &self,
        organization_id: Option<Uuid>,
        email: &str,
        permissions: PermissionSet,
        is_owner: bool,
    ) -> Identity {
        let identity = self
            .accounts
            .register(email, PASSWORD)
            .expect("account registers");
        self.directory.insert_staff(
            Profile {
                id: identity.id,
                name: format!("Staff {}", email),
                email: identity.email.clone(),
                organization_id,
                organization_name: organization_id.map(|_| "Test Clinic".to_string()),
                is_owner,
            },
            permissions,
        );
        identity
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, path: &str, form: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string())).unwrap())
            .await
    }

    /// Sign in through the HTTP surface; returns the session cookie.
    pub async fn sign_in(&self, email: &str) -> String {
        let response = self
            .post_form(
                "/auth",
                &format!("email={}&password={}", email.replace('@', "%40"), PASSWORD),
                None,
            )
            .await;
        assert!(
            response.status().is_redirection(),
            "sign-in failed with {}",
            response.status()
        );
        session_cookie(&response).expect("sign-in sets a session cookie")
    }
}

/// `name=value` of the session cookie set by `response`.
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(|pair| pair.trim().to_string())
        .next()
}

pub fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
}

pub async fn body_string(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
