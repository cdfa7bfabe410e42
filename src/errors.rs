use axum::{http::StatusCode, Json};
use serde_json::json;
use thiserror::Error;

/// Failures of the authorization flow and the provider API.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("authorization callback did not include a code")]
    MissingCode,

    #[error("authorization state does not match a pending request")]
    StateMismatch,

    #[error("token exchange failed{}: {body}", status_suffix(.status))]
    TokenExchangeFailed { status: Option<u16>, body: String },

    #[error("upstream API error{}: {body}", status_suffix(.status))]
    UpstreamApi { status: Option<u16>, body: String },

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("{0}")]
    Validation(String),
}

impl DashboardError {
    pub fn upstream(status: Option<u16>, body: impl Into<String>) -> Self {
        Self::UpstreamApi {
            status,
            body: body.into(),
        }
    }

    pub fn token_exchange(status: Option<u16>, body: impl Into<String>) -> Self {
        Self::TokenExchangeFailed {
            status,
            body: body.into(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" ({code})")).unwrap_or_default()
}

/// Route-boundary error rendered as `{success: false, message, timestamp}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// JSON API routes report domain failures in the body, not the status line.
    pub fn soft(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

impl From<DashboardError> for AppError {
    fn from(err: DashboardError) -> Self {
        Self::soft(err.to_string())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({
            "success": false,
            "message": self.message,
            "timestamp": crate::models::timestamp_now(),
        });
        (self.status, Json(body)).into_response()
    }
}
