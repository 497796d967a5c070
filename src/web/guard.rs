use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::future::Future;
use time::OffsetDateTime;

use crate::app::AppState;
use crate::error::OAuthError;
use crate::scopes::ScopeSet;
use crate::security;

/// Authenticated bearer principal attached to every resource request that
/// passes the access-token gate.
///
/// The gate applies its checks in a fixed order, each a hard fail point:
/// header shape, token signature, store row present and unrevoked, then
/// wall-clock expiry. All four collapse to `invalid_token`/401 on the wire;
/// only the scope check (done per-operation via [`require_scope`]) is
/// reported distinctly, as `insufficient_scope`/403.
///
/// Usage:
/// ```ignore
/// async fn handler(principal: OAuthPrincipal) -> impl IntoResponse {
///     principal.require_scope("calendar:read")?;
///     // ...
/// }
/// ```
///
/// [`require_scope`]: OAuthPrincipal::require_scope
pub struct OAuthPrincipal {
    pub user_id: String,
    pub client_id: String,
    pub scope: ScopeSet,
    pub token_id: String,
}

impl OAuthPrincipal {
    pub fn require_scope(&self, required: &str) -> Result<(), OAuthError> {
        if ScopeSet::parse(required).is_subset(&self.scope) {
            Ok(())
        } else {
            tracing::warn!(
                client_id = %self.client_id,
                required,
                granted = %self.scope,
                "request rejected for insufficient scope"
            );
            Err(OAuthError::InsufficientScope)
        }
    }
}

impl FromRequestParts<AppState> for OAuthPrincipal {
    type Rejection = OAuthError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let header = parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            let Some(bearer) = header.and_then(|h| h.strip_prefix("Bearer ")) else {
                tracing::warn!("bearer token rejected: missing or malformed Authorization header");
                return Err(OAuthError::InvalidToken);
            };

            if security::verify_access_token(&state.config.oauth.signing_secret, bearer).is_none() {
                tracing::warn!("bearer token rejected: signature verification failed");
                return Err(OAuthError::InvalidToken);
            }

            let token_hash = security::hash_token(bearer);
            let record = state
                .oauth
                .find_token_by_hash(&token_hash)
                .await
                .map_err(OAuthError::Server)?;
            let Some(record) = record else {
                tracing::warn!("bearer token rejected: not present in token store");
                return Err(OAuthError::InvalidToken);
            };
            if record.is_revoked() {
                tracing::warn!(token_id = %record.id, "bearer token rejected: revoked");
                return Err(OAuthError::InvalidToken);
            }
            if record.is_expired(OffsetDateTime::now_utc()) {
                tracing::warn!(token_id = %record.id, "bearer token rejected: expired");
                return Err(OAuthError::InvalidToken);
            }

            // Last-used bookkeeping is best effort and must not block the
            // request.
            let oauth = state.oauth.clone();
            let token_id = record.id.clone();
            tokio::spawn(async move {
                if let Err(e) = oauth.touch_token_last_used(&token_id).await {
                    tracing::debug!(error = ?e, "failed to update token last_used_at");
                }
            });

            Ok(OAuthPrincipal {
                user_id: record.user_id,
                client_id: record.client_id,
                scope: ScopeSet::parse(&record.scope),
                token_id: record.id,
            })
        }
    }
}
