use axum::{
    extract::{Form, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::OAuthError;
use crate::models::{access_token::OAuthAccessToken, client::OAuthClient};
use crate::repos::CodeRedemption;
use crate::security;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
    pub scope: String,
}

/// POST /oauth/token — exchange a code for a token pair, or rotate a pair
/// via a refresh token.
pub async fn token(State(state): State<AppState>, Form(req): Form<TokenRequest>) -> Response {
    match req.grant_type.as_deref() {
        Some("authorization_code") => authorization_code_grant(&state, &req).await,
        Some("refresh_token") => refresh_token_grant(&state, &req).await,
        Some(other) => OAuthError::UnsupportedGrantType(other.to_string()).into_response(),
        None => OAuthError::InvalidRequest("missing grant_type parameter".to_string())
            .into_response(),
    }
}

async fn authorization_code_grant(state: &AppState, req: &TokenRequest) -> Response {
    let (Some(code), Some(client_id), Some(client_secret), Some(redirect_uri)) = (
        req.code.as_deref(),
        req.client_id.as_deref(),
        req.client_secret.as_deref(),
        req.redirect_uri.as_deref(),
    ) else {
        return OAuthError::InvalidRequest(
            "missing required parameters: code, client_id, client_secret, redirect_uri"
                .to_string(),
        )
        .into_response();
    };

    // Client authentication comes first so unauthenticated callers learn
    // nothing about code validity.
    let client = match authenticate_client(state, client_id, client_secret).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    // Pre-read the code only to learn its bindings for the new token row.
    // Validity is decided inside the redemption transaction below.
    let code_hash = security::hash_token(code);
    let pending = match state.oauth.find_code(&code_hash).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            tracing::warn!(client_id = %client.client_id, "invalid_grant: code not found");
            return OAuthError::InvalidGrant.into_response();
        }
        Err(e) => return OAuthError::Server(e).into_response(),
    };

    let (row, access_token, refresh_token) = match mint_token_pair(
        state,
        &client.client_id,
        &pending.user_id,
        &pending.scope,
    ) {
        Ok(v) => v,
        Err(e) => return OAuthError::Server(e).into_response(),
    };
    let expires_in = state.config.oauth.access_token_ttl_secs;
    let scope = pending.scope.clone();

    let outcome = match state
        .oauth
        .redeem_code(&code_hash, &client.client_id, redirect_uri, row)
        .await
    {
        Ok(o) => o,
        Err(e) => return OAuthError::Server(e).into_response(),
    };
    match outcome {
        CodeRedemption::Redeemed(code_row) => {
            tracing::info!(
                user_id = %code_row.user_id,
                client_id = %client.client_id,
                scope = %scope,
                "access token issued via authorization_code grant"
            );
            Json(TokenResponse {
                access_token,
                token_type: "Bearer".to_string(),
                expires_in,
                refresh_token,
                scope,
            })
            .into_response()
        }
        rejected => {
            // Uniform invalid_grant on the wire; the precise reason goes to
            // the logs only.
            tracing::warn!(
                client_id = %client.client_id,
                reason = rejected.rejection_reason().unwrap_or("unknown"),
                "invalid_grant: code redemption rejected"
            );
            OAuthError::InvalidGrant.into_response()
        }
    }
}

async fn refresh_token_grant(state: &AppState, req: &TokenRequest) -> Response {
    let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
        req.refresh_token.as_deref(),
        req.client_id.as_deref(),
        req.client_secret.as_deref(),
    ) else {
        return OAuthError::InvalidRequest(
            "missing required parameters: refresh_token, client_id, client_secret".to_string(),
        )
        .into_response();
    };

    let client = match authenticate_client(state, client_id, client_secret).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    // Refresh tokens carry no expiry of their own: a pair stays
    // refreshable until rotated or revoked, even after the access token
    // lapses. Only revocation is checked here.
    let refresh_hash = security::hash_token(refresh_token);
    let old = match state
        .oauth
        .find_token_by_refresh_hash(&refresh_hash, &client.client_id)
        .await
    {
        Ok(Some(t)) => t,
        Ok(None) => {
            tracing::warn!(
                client_id = %client.client_id,
                "invalid_grant: refresh token unknown or revoked"
            );
            return OAuthError::InvalidGrant.into_response();
        }
        Err(e) => return OAuthError::Server(e).into_response(),
    };

    let (row, access_token, refresh_token) =
        match mint_token_pair(state, &client.client_id, &old.user_id, &old.scope) {
            Ok(v) => v,
            Err(e) => return OAuthError::Server(e).into_response(),
        };
    let scope = old.scope.clone();

    match state.oauth.rotate_token(&old.id, row).await {
        Ok(true) => {
            tracing::info!(
                user_id = %old.user_id,
                client_id = %client.client_id,
                old_token_id = %old.id,
                "token pair rotated via refresh_token grant"
            );
            Json(TokenResponse {
                access_token,
                token_type: "Bearer".to_string(),
                expires_in: state.config.oauth.access_token_ttl_secs,
                refresh_token,
                scope,
            })
            .into_response()
        }
        Ok(false) => {
            tracing::warn!(
                client_id = %client.client_id,
                old_token_id = %old.id,
                "invalid_grant: refresh token revoked concurrently"
            );
            OAuthError::InvalidGrant.into_response()
        }
        Err(e) => OAuthError::Server(e).into_response(),
    }
}

async fn authenticate_client(
    state: &AppState,
    client_id: &str,
    client_secret: &str,
) -> Result<OAuthClient, OAuthError> {
    let client = match state.oauth.find_client(client_id).await {
        Ok(Some(c)) if c.is_active() => c,
        Ok(_) => {
            tracing::warn!(client_id, "invalid_client: unknown or inactive");
            return Err(OAuthError::InvalidClient);
        }
        Err(e) => return Err(OAuthError::Server(e)),
    };
    if !security::verify_client_secret(&client.client_secret_hash, client_secret) {
        tracing::warn!(client_id, "invalid_client: secret verification failed");
        return Err(OAuthError::InvalidClient);
    }
    Ok(client)
}

/// Mint a signed access token and opaque refresh token, and the store row
/// holding their digests. The row is not inserted here; redemption and
/// rotation insert it inside their own transactions.
fn mint_token_pair(
    state: &AppState,
    client_id: &str,
    user_id: &str,
    scope: &str,
) -> anyhow::Result<(OAuthAccessToken, String, String)> {
    let now = OffsetDateTime::now_utc();
    let expires_at = now + Duration::seconds(state.config.oauth.access_token_ttl_secs);
    let token_id = Uuid::new_v4().to_string();
    let access_token = security::mint_access_token(
        &state.config.oauth.signing_secret,
        user_id,
        client_id,
        scope,
        &token_id,
        expires_at,
    )?;
    let refresh_token = security::random_urlsafe(32);
    let row = OAuthAccessToken {
        id: token_id,
        token_hash: security::hash_token(&access_token),
        refresh_token_hash: Some(security::hash_token(&refresh_token)),
        client_id: client_id.to_string(),
        user_id: user_id.to_string(),
        scope: scope.to_string(),
        expires_at: security::format_rfc3339(expires_at),
        created_at: security::format_rfc3339(now),
        last_used_at: None,
        revoked_at: None,
    };
    Ok((row, access_token, refresh_token))
}
