//! Request-level error type.
//!
//! Handlers return `Result<T, AppError>`. Client errors are shown as-is;
//! internal errors are logged in full and replaced by a generic message so
//! paths and SQL never reach the browser.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use thiserror::Error;
use tracing::error;

use crate::agent::ToolError;

#[derive(Debug, Error)]
pub enum AppError {
    /// No (or an expired) session; the browser is sent to the login page.
    #[error("login required")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ToolError> for AppError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::InvalidRange(_) | ToolError::NoSource | ToolError::MissingInput(_) => {
                AppError::BadRequest(e.to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => return Redirect::to("/login").into_response(),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::Database(e) => {
                error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_owned())
            }
            AppError::Template(e) => {
                error!(error = %e, "template error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_owned())
            }
            AppError::Internal(m) => {
                error!(message = %m, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_owned())
            }
        };
        (status, Html(error_page(status, &message))).into_response()
    }
}

fn error_page(status: StatusCode, message: &str) -> String {
    format!(
        "<!doctype html><html><head><title>{code}</title></head><body><h1>{code}</h1><p>{msg}</p><p><a href=\"/dashboard\">Back to dashboard</a></p></body></html>",
        code = status,
        msg = escape_html(message)
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_redirects() {
        let res = AppError::Unauthorized.into_response();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()["location"], "/login");
    }

    #[test]
    fn test_tool_errors_map_to_status() {
        let res = AppError::from(ToolError::InvalidRange("bad".into())).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let res = AppError::from(ToolError::TimedOut { tool: "ffprobe" }).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href='x'>&</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;");
    }
}
