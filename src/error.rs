use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Per-request failures surfaced to the caller
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Error creating proxy request: {0}")]
    RequestBuild(String),

    #[error("Error sending proxy request: {0}")]
    Upstream(String),

    #[error("Error reading proxy response: {0}")]
    UpstreamRead(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::RequestBuild(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ProxyError::RequestBuild(_) => "REQUEST_BUILD_ERROR",
            ProxyError::Upstream(_) => "UPSTREAM_ERROR",
            ProxyError::UpstreamRead(_) => "UPSTREAM_READ_ERROR",
            ProxyError::BadRequest(_) => "BAD_REQUEST",
            ProxyError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "status": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
