//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

/// Error type returned by every handler. Carries the status the failure
/// maps to; the body is always `{ "error": "<message>" }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<recado_store::Error> for ApiError {
    fn from(e: recado_store::Error) -> Self {
        let status = match &e {
            recado_store::Error::NotFound { .. }
            | recado_store::Error::ReminderNotFound { .. }
            | recado_store::Error::QuickReplyNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<recado_dispatch::Error> for ApiError {
    fn from(e: recado_dispatch::Error) -> Self {
        use recado_dispatch::Error;
        let status = match &e {
            Error::NotConnected => StatusCode::CONFLICT,
            Error::CampaignNotFound(_) => StatusCode::NOT_FOUND,
            Error::EmptyTargetList | Error::EmptyMessage | Error::EmptySegment => {
                StatusCode::BAD_REQUEST
            },
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<recado_session::Error> for ApiError {
    fn from(e: recado_session::Error) -> Self {
        use recado_session::Error;
        let status = match &e {
            Error::NotConnected => StatusCode::CONFLICT,
            Error::SendTimeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<recado_common::error::Error> for ApiError {
    fn from(e: recado_common::error::Error) -> Self {
        Self::bad_request(e.to_string())
    }
}
