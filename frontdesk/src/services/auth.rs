//! Authentication collaborator.
//!
//! The session store only ever talks to an [`AuthProvider`]; the hosted
//! GoTrue client and the in-memory provider both implement it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::Identity;

/// Capacity of an auth event channel. A lagging listener re-reads
/// `current_session` instead of replaying missed events.
pub const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Emitted once per subscriber with whatever the provider already knew.
    InitialSession(Option<Identity>),
    SignedIn(Identity),
    TokenRefreshed(Identity),
    SignedOut,
}

impl AuthEvent {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthEvent::InitialSession(identity) => identity.as_ref(),
            AuthEvent::SignedIn(identity) | AuthEvent::TokenRefreshed(identity) => Some(identity),
            AuthEvent::SignedOut => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::InitialSession(_) => "initial_session",
            AuthEvent::SignedIn(_) => "signed_in",
            AuthEvent::TokenRefreshed(_) => "token_refreshed",
            AuthEvent::SignedOut => "signed_out",
        }
    }
}

/// Bearer tokens issued by the auth backend. Kept in the cookie session so
/// a restarted session store can recover the signed-in identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthTokens {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub identity: Identity,
    pub tokens: AuthTokens,
}

/// Metadata attached to a new account.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignUpAttributes {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Authentication service unreachable: {0}")]
    Network(String),

    #[error("Authentication service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected authentication response: {0}")]
    Malformed(String),
}

impl AuthError {
    /// Message safe to show next to the sign-in form.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "Invalid email or password",
            AuthError::EmailTaken => "Email might already be in use",
            AuthError::Network(_) => "The authentication service is unreachable, try again",
            AuthError::Rejected { .. } | AuthError::Malformed(_) => "Authentication error",
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AuthError::Malformed(e.to_string())
        } else {
            AuthError::Network(e.to_string())
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: SignUpAttributes,
    ) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn refresh_session(&self) -> Result<AuthSession, AuthError>;

    /// The session the provider currently holds, refreshed first when its
    /// access token has expired. `None` when nobody is signed in.
    async fn current_session(&self) -> Option<AuthSession>;

    /// Access token for backend calls made on behalf of the signed-in user.
    async fn access_token(&self) -> Option<String> {
        self.current_session()
            .await
            .map(|session| session.tokens.access_token)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
