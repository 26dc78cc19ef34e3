use askama::Template;
use axum::{http::StatusCode, response::IntoResponse};

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {}

#[derive(Template)]
#[template(path = "unauthorized.html")]
pub struct UnauthorizedTemplate {}

pub async fn index() -> impl IntoResponse {
    IndexTemplate {}
}

pub async fn unauthorized() -> impl IntoResponse {
    (StatusCode::FORBIDDEN, UnauthorizedTemplate {})
}

pub async fn health_check() -> &'static str {
    "OK"
}
