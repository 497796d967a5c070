use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::app::AppState;
use crate::error::OAuthError;
use crate::web::guard::OAuthPrincipal;

#[derive(Debug, Serialize)]
pub struct AuthorizedApp {
    pub client_id: String,
    pub client_name: String,
    pub client_description: String,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub scope: String,
    pub authorized_at: String,
    pub last_used_at: Option<String>,
    pub token_count: usize,
}

/// GET /oauth/authorized-apps — one summary row per client holding active
/// tokens for the calling user. Read-only aggregation; scope and
/// timestamps come from the most recently issued token of each client.
pub async fn authorized_apps(
    State(state): State<AppState>,
    principal: OAuthPrincipal,
) -> Response {
    let tokens = match state
        .oauth
        .list_active_tokens_for_user(&principal.user_id)
        .await
    {
        Ok(t) => t,
        Err(e) => return OAuthError::Server(e).into_response(),
    };

    // Tokens arrive newest first; the first token seen per client defines
    // the summary and later ones only bump the count.
    let mut apps: Vec<AuthorizedApp> = Vec::new();
    for token in tokens {
        if let Some(entry) = apps.iter_mut().find(|a| a.client_id == token.client_id) {
            entry.token_count += 1;
            continue;
        }
        let client = match state.oauth.find_client(&token.client_id).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                tracing::warn!(client_id = %token.client_id, "active token for unknown client, skipping");
                continue;
            }
            Err(e) => return OAuthError::Server(e).into_response(),
        };
        apps.push(AuthorizedApp {
            client_id: client.client_id,
            client_name: client.client_name,
            client_description: client.client_description,
            logo_url: client.logo_url,
            website_url: client.website_url,
            scope: token.scope,
            authorized_at: token.created_at,
            last_used_at: token.last_used_at,
            token_count: 1,
        });
    }

    let total = apps.len();
    tracing::debug!(user_id = %principal.user_id, total, "authorized apps listed");
    Json(json!({ "apps": apps, "total": total })).into_response()
}
