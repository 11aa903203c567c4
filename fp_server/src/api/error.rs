//! Mapping from identity errors to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fingerprint::{ErrorKind, IdentityError};
use serde::{Deserialize, Serialize};

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

/// HTTP-facing error
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Error from session lookup, where a token that fails to open is the
    /// caller's problem rather than the server's
    pub fn from_session_lookup(err: IdentityError) -> Self {
        let mut api = Self::from(err);
        if api.kind == ErrorKind::Crypto {
            api.status = StatusCode::UNAUTHORIZED;
        }
        api
    }
}

/// Status code for an error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Crypto | ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        let kind = err.kind();
        if matches!(kind, ErrorKind::Store | ErrorKind::Crypto) {
            tracing::error!(kind = kind.as_str(), "Request failed: {}", err);
        }

        Self {
            status: status_for(kind),
            kind,
            message: err.client_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                kind: self.kind.as_str().to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (IdentityError::PasswordMismatch, StatusCode::BAD_REQUEST),
            (IdentityError::EmptyScopes, StatusCode::BAD_REQUEST),
            (IdentityError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (IdentityError::UserNotFound, StatusCode::NOT_FOUND),
            (IdentityError::ResetTokenNotFound, StatusCode::NOT_FOUND),
            (IdentityError::EmailTaken, StatusCode::CONFLICT),
            (IdentityError::DeadlineExceeded, StatusCode::GATEWAY_TIMEOUT),
            (
                IdentityError::Store("down".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                IdentityError::Crypto("bad".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_session_lookup_crypto_is_unauthorized() {
        let api = ApiError::from_session_lookup(IdentityError::Crypto("tag".to_string()));
        assert_eq!(api.status(), StatusCode::UNAUTHORIZED);

        let api = ApiError::from_session_lookup(IdentityError::SessionNotFound);
        assert_eq!(api.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_store_details_not_exposed() {
        let api = ApiError::from(IdentityError::Store("relation users missing".to_string()));
        assert_eq!(api.message, "Internal server error");
    }
}
