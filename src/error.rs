use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error taxonomy of the OAuth surface. The variant picks both the wire
/// `error` code and the HTTP status; descriptions are deliberately uniform
/// for grant and token failures so callers cannot distinguish expired from
/// used from never-existed (the precise reason goes to the logs instead).
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("client authentication failed")]
    InvalidClient,
    #[error("redirect_uri is not registered for this client")]
    InvalidRedirectUri,
    #[error("requested scope exceeds the scopes allowed for this client")]
    InvalidScope,
    #[error("the provided grant is invalid, expired, or already used")]
    InvalidGrant,
    #[error("unsupported grant_type: {0}")]
    UnsupportedGrantType(String),
    #[error("the resource owner denied the request")]
    AccessDenied,
    #[error("the access token is missing, invalid, expired, or revoked")]
    InvalidToken,
    #[error("the token does not grant the required scope")]
    InsufficientScope,
    #[error("internal server error")]
    Server(#[from] anyhow::Error),
}

impl OAuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidRedirectUri => "invalid_redirect_uri",
            OAuthError::InvalidScope => "invalid_scope",
            OAuthError::InvalidGrant => "invalid_grant",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::AccessDenied => "access_denied",
            OAuthError::InvalidToken => "invalid_token",
            OAuthError::InsufficientScope => "insufficient_scope",
            OAuthError::Server(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidRequest(_)
            | OAuthError::InvalidRedirectUri
            | OAuthError::InvalidScope
            | OAuthError::InvalidGrant
            | OAuthError::UnsupportedGrantType(_)
            | OAuthError::AccessDenied => StatusCode::BAD_REQUEST,
            OAuthError::InvalidClient | OAuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            OAuthError::InsufficientScope => StatusCode::FORBIDDEN,
            OAuthError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Description safe to put on the wire. Server errors never leak their
    /// cause; everything else uses the Display form.
    pub fn public_description(&self) -> String {
        match self {
            OAuthError::Server(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        if let OAuthError::Server(ref cause) = self {
            tracing::error!(error = ?cause, "request failed with server error");
        }
        let body = json!({
            "error": self.error_code(),
            "error_description": self.public_description(),
        });
        (self.status(), Json(body)).into_response()
    }
}
