use askama::Template;
use axum::{
    Form,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use service_core::error::AppError;
use tower_sessions::Session as CookieSession;
use validator::Validate;

use crate::AppState;
use crate::authz::guard::AUTH_ENTRY;
use crate::middleware::guard::redirect;

const AFTER_SIGN_IN: &str = "/dashboard";

#[derive(Template)]
#[template(path = "auth.html")]
pub struct AuthTemplate {
    pub error: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct SignInForm {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Enter your password"))]
    pub password: String,
}

pub async fn auth_page(
    State(state): State<AppState>,
    cookie: CookieSession,
) -> Result<Response, AppError> {
    if let Some(client) = state.registry.for_cookie(&cookie).await? {
        if client.store.settled(state.guard_wait).await.is_authenticated() {
            return Ok(Redirect::to(AFTER_SIGN_IN).into_response());
        }
    }
    Ok(AuthTemplate { error: None }.into_response())
}

pub async fn sign_in(
    State(state): State<AppState>,
    cookie: CookieSession,
    headers: HeaderMap,
    Form(form): Form<SignInForm>,
) -> Result<Response, AppError> {
    if form.validate().is_err() {
        return Ok(sign_in_failed(
            &headers,
            StatusCode::UNPROCESSABLE_ENTITY,
            "Enter a valid email and password",
        ));
    }

    let client = state.registry.start_client();
    match client.store.sign_in(form.email.trim(), &form.password).await {
        Ok(auth_session) => {
            if let Err(e) = state.registry.attach(&cookie, &client, &auth_session).await {
                tracing::error!(error = %e, client_id = %client.client_id, "Failed to bind signed-in client");
                if let Err(sign_out_error) = client.store.sign_out().await {
                    tracing::warn!(error = %sign_out_error, "Sign-out failed at the auth backend");
                }
                return Err(e.into());
            }
            // the next request should not observe the pre-sign-in state
            client
                .store
                .settled_for(auth_session.identity.id, state.guard_wait)
                .await;
            tracing::info!(
                user_id = %auth_session.identity.id,
                client_id = %client.client_id,
                "Staff member signed in"
            );
            Ok(redirect(&headers, AFTER_SIGN_IN))
        }
        Err(e) => {
            state.registry.remove(&client.client_id);
            tracing::warn!(error = %e, "Sign-in failed");
            let status = match e {
                crate::services::AuthError::Network(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            Ok(sign_in_failed(&headers, status, e.user_message()))
        }
    }
}

pub async fn sign_out(
    State(state): State<AppState>,
    cookie: CookieSession,
) -> Result<Redirect, AppError> {
    if let Some(client) = state.registry.for_cookie(&cookie).await? {
        if let Err(e) = client.store.sign_out().await {
            tracing::warn!(error = %e, "Sign-out failed at the auth backend");
        }
    }
    state.registry.detach(&cookie).await?;
    Ok(Redirect::to(AUTH_ENTRY))
}

/// Inline error fragment for htmx, the full page otherwise.
fn sign_in_failed(headers: &HeaderMap, status: StatusCode, message: &str) -> Response {
    if headers.contains_key("hx-request") {
        (
            status,
            Html(format!("<p class='text-red-500 text-sm'>{}</p>", message)),
        )
            .into_response()
    } else {
        (
            status,
            AuthTemplate {
                error: Some(message.to_string()),
            },
        )
            .into_response()
    }
}
