use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};

use crate::app::AppState;
use crate::error::OAuthError;
use crate::models::user::IdentityLink;
use crate::scopes;
use crate::web::guard::OAuthPrincipal;

/// GET /oauth/userinfo — profile of the resource owner behind the bearer
/// token. Identity and timestamps are always returned; contact and
/// provider-linked fields require the `user:read` scope and are filtered
/// per field, not by rejecting the call.
pub async fn userinfo(State(state): State<AppState>, principal: OAuthPrincipal) -> Response {
    let user = match state.oauth.find_user(&principal.user_id).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            // A token outliving its user is treated like any other dead token.
            tracing::warn!(user_id = %principal.user_id, "bearer token rejected: user no longer exists");
            return OAuthError::InvalidToken.into_response();
        }
        Err(e) => return OAuthError::Server(e).into_response(),
    };

    let mut body = Map::new();
    body.insert("user_id".to_string(), json!(user.id));
    body.insert("username".to_string(), json!(user.public_name()));
    body.insert("provider".to_string(), json!(user.provider));
    body.insert("created_at".to_string(), json!(user.created_at));

    if principal.scope.contains(scopes::USER_READ) {
        body.insert("email".to_string(), json!(user.email));
        if let Some(avatar) = &user.avatar {
            body.insert("avatar".to_string(), json!(avatar));
        }
        match user.identity() {
            IdentityLink::Qq { openid, unionid } => {
                body.insert("openid".to_string(), json!(openid));
                if let Some(unionid) = unionid {
                    body.insert("unionid".to_string(), json!(unionid));
                }
            }
            IdentityLink::AcWing { openid } => {
                body.insert("openid".to_string(), json!(openid));
            }
            IdentityLink::None => {}
        }
    }

    tracing::debug!(user_id = %user.id, client_id = %principal.client_id, "userinfo returned");
    Json(Value::Object(body)).into_response()
}
