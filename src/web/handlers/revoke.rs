use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::error::OAuthError;
use crate::web::guard::OAuthPrincipal;

#[derive(Debug, Default, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub revoke_all: bool,
}

/// POST /oauth/revoke — resource-owner revocation.
///
/// Three modes, all scoped to the calling user's own grants:
/// no `client_id` revokes the token used on this request; `client_id`
/// revokes that client's most recent active token; `client_id` +
/// `revoke_all` revokes every active token for that client. Bulk
/// revocation is idempotent (count 0 on repeat); the single-token mode
/// answers 404 `no_token` when nothing is active.
pub async fn revoke(
    State(state): State<AppState>,
    principal: OAuthPrincipal,
    Json(req): Json<RevokeRequest>,
) -> Response {
    let Some(client_id) = req.client_id.as_deref().filter(|s| !s.is_empty()) else {
        // Self-revoke: the gate guarantees the token was active a moment
        // ago, so a zero-row update just means someone beat us to it.
        return match state.oauth.revoke_token(&principal.token_id).await {
            Ok(_) => {
                tracing::info!(
                    user_id = %principal.user_id,
                    token_id = %principal.token_id,
                    "current access token revoked"
                );
                Json(json!({
                    "success": true,
                    "message": "current access token revoked",
                }))
                .into_response()
            }
            Err(e) => OAuthError::Server(e).into_response(),
        };
    };

    // The ownership check is on the user, not the client: the update below
    // only ever touches rows belonging to the caller.
    match state.oauth.find_client(client_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::warn!(client_id, "revoke rejected: unknown client_id");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid_client",
                    "error_description": "unknown client_id",
                })),
            )
                .into_response();
        }
        Err(e) => return OAuthError::Server(e).into_response(),
    }

    if req.revoke_all {
        match state
            .oauth
            .revoke_all_for_client(&principal.user_id, client_id)
            .await
        {
            Ok(count) => {
                tracing::info!(
                    user_id = %principal.user_id,
                    client_id,
                    count,
                    "revoked all tokens for client"
                );
                Json(json!({
                    "success": true,
                    "message": format!("revoked {count} access tokens"),
                    "revoked_count": count,
                }))
                .into_response()
            }
            Err(e) => OAuthError::Server(e).into_response(),
        }
    } else {
        let token = match state
            .oauth
            .find_active_token_for_client(&principal.user_id, client_id)
            .await
        {
            Ok(t) => t,
            Err(e) => return OAuthError::Server(e).into_response(),
        };
        match token {
            Some(token) => match state.oauth.revoke_token(&token.id).await {
                Ok(_) => {
                    tracing::info!(
                        user_id = %principal.user_id,
                        client_id,
                        token_id = %token.id,
                        "access token revoked"
                    );
                    Json(json!({
                        "success": true,
                        "message": "access token revoked",
                    }))
                    .into_response()
                }
                Err(e) => OAuthError::Server(e).into_response(),
            },
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "no_token",
                    "error_description": "no active access token for this client",
                })),
            )
                .into_response(),
        }
    }
}
