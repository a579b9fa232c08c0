use crate::error::CarenetError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

impl CarenetError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CarenetError::RootNotFound { .. } => StatusCode::NOT_FOUND,
            CarenetError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CarenetError::Conflict(_) => StatusCode::CONFLICT,
            CarenetError::DependencyTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CarenetError::DependencyUnavailable { .. } | CarenetError::CircuitOpen(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CarenetError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        (
            status,
            Json(json!({
                "status": status.as_u16(),
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}
