//! JSON response envelopes.
//!
//! # Responsibilities
//! - Uniform `{ok, backend_reply?, error?}` body for every API endpoint
//! - Map dispatcher errors to HTTP status codes
//!
//! # Design Decisions
//! - Backend replies are passed through raw; parsing them is the web
//!   client's concern
//! - Every dispatcher failure is a 500; request-shape problems keep the
//!   extractor's 4xx status
//! - Failures produced by middleware (request timeout) get the same envelope

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::BridgeError;

/// Success body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_reply: Option<String>,
}

impl ApiResponse {
    /// `{ok:true}`
    pub fn ok() -> Self {
        Self {
            ok: true,
            backend_reply: None,
        }
    }

    /// `{ok:true, backend_reply}`
    pub fn reply(backend_reply: String) -> Self {
        Self {
            ok: true,
            backend_reply: Some(backend_reply),
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

/// Failure with its HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn missing_username() -> Self {
        Self::bad_request("missing username")
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            ok: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Handler result type.
pub type ApiResult = Result<ApiResponse, ApiError>;

/// Replace the timeout layer's empty 408 with the error envelope.
pub async fn timeout_envelope(response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }
    ApiError {
        status: StatusCode::REQUEST_TIMEOUT,
        message: "request timed out".to_string(),
    }
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_bodies() {
        let body = serde_json::to_value(ApiResponse::ok()).unwrap();
        assert_eq!(body, serde_json::json!({ "ok": true }));

        let body =
            serde_json::to_value(ApiResponse::reply("type:groups_list|groups:".into())).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "ok": true, "backend_reply": "type:groups_list|groups:" })
        );
    }

    #[test]
    fn test_dispatcher_errors_are_server_errors() {
        let err = ApiError::from(BridgeError::NotLoggedIn("bob".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("bob"));

        let err = ApiError::from(BridgeError::ConnectionClosed);
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_timeout_envelope() {
        let response = timeout_envelope(StatusCode::REQUEST_TIMEOUT.into_response()).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "ok": false, "error": "request timed out" }));

        let response = timeout_envelope(StatusCode::OK.into_response()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_missing_username_is_bad_request() {
        let err = ApiError::missing_username();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "missing username");
    }
}
