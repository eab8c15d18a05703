// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of [`ZaplineError`] onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use zapline_core::ZaplineError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code.
    pub code: &'static str,
    pub error: String,
}

/// A [`ZaplineError`] returned from a handler.
#[derive(Debug)]
pub struct ApiError(pub ZaplineError);

impl From<ZaplineError> for ApiError {
    fn from(err: ZaplineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            ZaplineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            ZaplineError::NotConnected { .. } => (StatusCode::CONFLICT, "not_connected"),
            ZaplineError::PairingTimeout { .. } => (StatusCode::CONFLICT, "pairing_timeout"),
            ZaplineError::ReconnectExhausted { .. } => {
                (StatusCode::CONFLICT, "reconnect_exhausted")
            }
            ZaplineError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            ZaplineError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            ZaplineError::Rejected { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "rejected"),
            ZaplineError::Gateway { .. } | ZaplineError::SocketClosed { .. } => {
                (StatusCode::BAD_GATEWAY, "gateway_error")
            }
            ZaplineError::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, "not_configured"),
            ZaplineError::Storage { .. }
            | ZaplineError::Handler { .. }
            | ZaplineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        // Internal details stay in the logs.
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(ErrorResponse { code, error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapline_core::{SessionState, TenantId};

    fn status_of(err: ZaplineError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn client_errors() {
        assert_eq!(
            status_of(ZaplineError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ZaplineError::NotConnected {
                tenant_id: TenantId::from("acme"),
                state: SessionState::Reconnecting,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ZaplineError::RateLimited { key: "acme".into() }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(ZaplineError::Rejected {
                message: "not on WhatsApp".into()
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn server_errors() {
        assert_eq!(
            status_of(ZaplineError::Timeout {
                duration: std::time::Duration::from_secs(1)
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(ZaplineError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ZaplineError::gateway("socket write failed")),
            StatusCode::BAD_GATEWAY
        );
    }
}
