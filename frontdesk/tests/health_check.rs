mod common;

use axum::http::StatusCode;
use common::{TestApp, body_string};

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::new();

    let response = app.get("/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");
}

#[tokio::test]
async fn public_pages_render_without_session() {
    let app = TestApp::new();

    for path in ["/", "/auth"] {
        let response = app.get(path, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
        assert!(
            response.headers().get("content-security-policy").is_some(),
            "{} is missing security headers",
            path
        );
    }

    let response = app.get("/unauthorized", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn metrics_are_exposed() {
    frontdesk::services::metrics::init_metrics().unwrap();
    let app = TestApp::new();
    app.get("/health", None).await;

    let response = app.get("/metrics", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("http_requests_total"));
}
