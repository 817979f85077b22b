use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lms_mailer::TemplateError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Please login to access this resource")]
    Unauthorized,

    #[error("Authentication failed")]
    InvalidToken,

    #[error("Role ({0}) is not allowed to access this resource")]
    Forbidden(String),

    #[error("{0}")]
    Delivery(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Template(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Email request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Email request rejected");
        }

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
