//! API error kinds and their HTTP rendering.
//!
//! Every failure that reaches a route handler is an [`ApiError`]; it renders as
//! `{"message": ...}` with the status code of its kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

const UNHANDLED_MESSAGE: &str = "An unhandled exception occurred.";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed repository URL or a taxonomy name that escapes the volume.
    #[error("{0}")]
    InvalidName(String),
    /// Missing or malformed request data.
    #[error("{0}")]
    BadRequest(String),
    /// Bad admin secret, bad session token, or denied permission.
    #[error("{0}")]
    Auth(String),
    #[error("taxonomy not found: {0}")]
    TaxonomyNotFound(String),
    /// Clone, checkout, `make init` or upgrade failed.
    #[error("{0}")]
    Initialization(String),
    /// The proxied tool exited nonzero (or could not be started).
    #[error("{0}")]
    ToolExecution(String),
    /// The proxied tool wrote a malformed CGI header block.
    #[error("malformed CGI response: {0}")]
    CgiProtocol(String),
    #[error("tool did not finish within {0} seconds")]
    ToolTimeout(u64),
    /// Permission lookup failed upstream; status mirrors the upstream response.
    #[error("{message}")]
    UpstreamLookup { status: u16, message: String },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidName(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::FORBIDDEN,
            ApiError::TaxonomyNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Initialization(_)
            | ApiError::ToolExecution(_)
            | ApiError::CgiProtocol(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ToolTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::UpstreamLookup { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(e) => {
                log::error!("unhandled error: {:#}", e);
                UNHANDLED_MESSAGE.to_string()
            }
            other => {
                if status.is_server_error() {
                    log::error!("{}", other);
                } else {
                    log::info!("request rejected ({}): {}", status.as_u16(), other);
                }
                other.to_string()
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_status_codes() {
        assert_eq!(ApiError::InvalidName("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Auth("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Initialization("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::CgiProtocol("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::ToolTimeout(3).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ApiError::UpstreamLookup {
                status: 404,
                message: "gone".into()
            }
            .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::UpstreamLookup {
                status: 42,
                message: "odd".into()
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn internal_error_renders_generic_message() {
        let res = ApiError::Internal(anyhow::anyhow!("secret path /etc/x")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
