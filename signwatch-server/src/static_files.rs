use crate::http::ErrorResponse;
use axum::{
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Json, Response},
};

const DASHBOARD_HTML: &str = include_str!("../assets/index.html");

/// Fallback for every path the router does not know
pub async fn serve_static(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');

    // SECURITY: Prevent path traversal attacks
    if path.contains("..") || path.contains("//") || path.contains('\\') {
        return error(StatusCode::BAD_REQUEST, "Invalid path", "INVALID_PATH");
    }

    if path.starts_with("api/") || path == "api" {
        return error(StatusCode::NOT_FOUND, "Not found", "NOT_FOUND");
    }

    dashboard().await.into_response()
}

/// The single-page dashboard
pub async fn dashboard() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-cache")],
        Html(DASHBOARD_HTML),
    )
}

fn error(status: StatusCode, message: &str, code: &str) -> Response {
    let body = Json(ErrorResponse {
        error: message.to_string(),
        code: code.to_string(),
    });
    (status, body).into_response()
}
