use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use service_core::observability::TracedClientExt;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use super::{APIKEY_HEADER, anon_key};
use crate::config::BackendSettings;
use crate::models::{Identity, UserId};
use crate::services::auth::{
    AuthError, AuthEvent, AuthProvider, AuthSession, AuthTokens, EVENT_CAPACITY, SignUpAttributes,
};
use crate::utils::jwt::decode_jwt_claims;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

/// Sign-up answers with either a bare user or a session wrapping one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session { user: UserResponse },
    User(UserResponse),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    error_code: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ErrorResponse {
    fn message(&self) -> String {
        self.error_description
            .as_ref()
            .or(self.msg.as_ref())
            .or(self.message.as_ref())
            .or(self.error.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        AuthSession {
            identity: Identity {
                id: UserId::from(self.user.id),
                email: self.user.email.unwrap_or_default(),
            },
            tokens: AuthTokens {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                expires_at: Utc::now() + Duration::seconds(self.expires_in),
            },
        }
    }
}

/// GoTrue client holding one browser's session.
pub struct SupabaseAuth {
    client: Client,
    settings: BackendSettings,
    current: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseAuth {
    pub fn new(client: Client, settings: BackendSettings) -> Self {
        Self::restore(client, settings, None)
    }

    /// Seed the client with persisted tokens. Tokens whose claims cannot be
    /// read are dropped and the client starts signed out.
    pub fn restore(client: Client, settings: BackendSettings, tokens: Option<AuthTokens>) -> Self {
        let current = tokens.and_then(|tokens| match decode_jwt_claims(&tokens.access_token) {
            Ok(claims) => Some(AuthSession {
                identity: Identity {
                    id: UserId::from(claims.sub),
                    email: claims.email.unwrap_or_default(),
                },
                tokens,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable persisted tokens");
                None
            }
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            settings,
            current: RwLock::new(current),
            events,
        }
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<AuthSession, AuthError> {
        let url = self
            .settings
            .endpoint(&format!("/auth/v1/token?grant_type={}", grant_type));
        let response = self
            .client
            .traced_post(&url)
            .header(APIKEY_HEADER, anon_key(&self.settings))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send POST request to {}: {}", url, e);
                AuthError::from(e)
            })?;

        let response = check(response).await?;
        let tokens: TokenResponse = response.json().await?;
        Ok(tokens.into_session())
    }

    async fn install(&self, session: AuthSession, event: AuthEvent) -> AuthSession {
        *self.current.write().await = Some(session.clone());
        let _ = self.events.send(event);
        session
    }
}

/// Map a non-success GoTrue response onto [`AuthError`].
async fn check(response: Response) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: ErrorResponse = response.json().await.unwrap_or_default();
    let code = body
        .error_code
        .as_deref()
        .or(body.error.as_deref())
        .unwrap_or_default();

    Err(match code {
        "invalid_grant" | "invalid_credentials" => AuthError::InvalidCredentials,
        "user_already_exists" | "email_exists" => AuthError::EmailTaken,
        _ if body.message().contains("already registered") => AuthError::EmailTaken,
        _ => AuthError::Rejected {
            status: status.as_u16(),
            message: body.message(),
        },
    })
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        tracing::info!(user_id = %session.identity.id, "Password sign-in accepted");
        let identity = session.identity.clone();
        Ok(self.install(session, AuthEvent::SignedIn(identity)).await)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: SignUpAttributes,
    ) -> Result<Identity, AuthError> {
        let url = self.settings.endpoint("/auth/v1/signup");
        let response = self
            .client
            .traced_post(&url)
            .header(APIKEY_HEADER, anon_key(&self.settings))
            .json(&json!({ "email": email, "password": password, "data": attributes }))
            .send()
            .await?;

        let user = match check(response).await?.json::<SignUpResponse>().await? {
            SignUpResponse::Session { user } | SignUpResponse::User(user) => user,
        };
        Ok(Identity {
            id: UserId::from(user.id),
            email: user.email.unwrap_or_else(|| email.to_string()),
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let previous = self.current.write().await.take();
        let _ = self.events.send(AuthEvent::SignedOut);

        // Local sign-out always succeeds; revocation failures are only logged.
        if let Some(previous) = previous {
            let url = self.settings.endpoint("/auth/v1/logout");
            let revoked = self
                .client
                .traced_post(&url)
                .header(APIKEY_HEADER, anon_key(&self.settings))
                .bearer_auth(&previous.tokens.access_token)
                .send()
                .await;
            match revoked {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    tracing::warn!(status = %response.status(), "Token revocation rejected")
                }
                Err(e) => tracing::warn!(error = %e, "Token revocation failed"),
            }
        }
        Ok(())
    }

    async fn refresh_session(&self) -> Result<AuthSession, AuthError> {
        let refresh_token = self
            .current
            .read()
            .await
            .as_ref()
            .map(|session| session.tokens.refresh_token.clone())
            .ok_or(AuthError::Rejected {
                status: 401,
                message: "no active session".to_string(),
            })?;

        let session = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        let identity = session.identity.clone();
        Ok(self.install(session, AuthEvent::TokenRefreshed(identity)).await)
    }

    async fn current_session(&self) -> Option<AuthSession> {
        let current = self.current.read().await.clone()?;
        if !current.tokens.is_expired(Utc::now()) {
            return Some(current);
        }
        match self.refresh_session().await {
            Ok(refreshed) => Some(refreshed),
            Err(e) => {
                tracing::warn!(error = %e, "Access token expired and refresh failed");
                None
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
