use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

use crate::util::error_response;

/// Failure talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection, DNS, TLS or timeout failure; the only kind the invoker retries.
    #[error("backend request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The backend answered, but not with 200. Only produced by session deletion.
    #[error("backend returned status {0}")]
    Status(StatusCode),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Transport(Box::new(e))
    }
}

/// Errors that reach the HTTP caller.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        error_response(self.status(), &self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            GatewayError::InvalidRequest("model is required".into()).status(),
            StatusCode::BAD_REQUEST
        );
        let transport = BackendError::Transport("connection refused".into());
        assert_eq!(
            GatewayError::from(transport).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn backend_message_is_passed_through() {
        let err = GatewayError::from(BackendError::Transport("connection refused".into()));
        assert_eq!(err.to_string(), "backend request failed: connection refused");
    }
}
