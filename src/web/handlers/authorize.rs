use axum::{
    extract::{Form, OriginalUri, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use tower_cookies::Cookies;
use url::Url;

use crate::app::AppState;
use crate::auth::session;
use crate::error::OAuthError;
use crate::models::{auth_code::AuthorizationCode, client::OAuthClient};
use crate::scopes::ScopeSet;
use crate::security;

/// Codes are short-lived by construction; this is not configurable.
const AUTH_CODE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeForm {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub action: Option<String>,
}

struct AuthorizeContext {
    client: OAuthClient,
    redirect_uri: String,
    scope: ScopeSet,
    state: Option<String>,
}

/// GET /oauth/authorize — validate the request, make sure a user is
/// present, and show the consent page.
pub async fn authorize_get(
    State(state): State<AppState>,
    cookies: Cookies,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let ctx = match validate_authorize_request(&state, &params).await {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    // Authentication is external. Suspend by sending the browser to the
    // login collaborator with the complete original request carried in
    // `next`, so the flow resumes here with nothing lost.
    let Some(sess) = session::get_session(&cookies, &state.cookie_key) else {
        let original = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/oauth/authorize".to_string());
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("next", &original)
            .finish();
        tracing::info!(client_id = %ctx.client.client_id, "user not authenticated, redirecting to login");
        return Redirect::temporary(&format!("/login?{query}")).into_response();
    };

    tracing::info!(
        user_id = %sess.user_id,
        client_id = %ctx.client.client_id,
        scope = %ctx.scope,
        "showing authorization consent page"
    );
    Html(render_consent_page(&ctx)).into_response()
}

/// POST /oauth/authorize — apply the user's grant-or-deny decision.
pub async fn authorize_post(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<AuthorizeForm>,
) -> Response {
    let params = AuthorizeParams {
        response_type: form.response_type.clone(),
        client_id: form.client_id.clone(),
        redirect_uri: form.redirect_uri.clone(),
        scope: form.scope.clone(),
        state: form.state.clone(),
    };
    let ctx = match validate_authorize_request(&state, &params).await {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    let Some(sess) = session::get_session(&cookies, &state.cookie_key) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "invalid_request",
                "error_description": "user is not authenticated",
            })),
        )
            .into_response();
    };

    match form.action.as_deref() {
        Some("authorize") => issue_code_and_redirect(&state, &sess.user_id, &ctx).await,
        Some("deny") => {
            // No state is created on denial.
            tracing::info!(
                user_id = %sess.user_id,
                client_id = %ctx.client.client_id,
                "user denied authorization"
            );
            error_redirect(&ctx.redirect_uri, &OAuthError::AccessDenied, ctx.state.as_deref())
        }
        other => OAuthError::InvalidRequest(format!(
            "invalid action: {}",
            other.unwrap_or("<missing>")
        ))
        .into_response(),
    }
}

/// Validation order matters: nothing may redirect until the client and its
/// redirect_uri have been proven, because redirecting errors to an
/// unverified URI is exactly the vulnerability this endpoint exists to
/// prevent. Scope failures come after that proof and do redirect.
async fn validate_authorize_request(
    state: &AppState,
    params: &AuthorizeParams,
) -> Result<AuthorizeContext, Response> {
    let (Some(client_id), Some(redirect_uri), Some(response_type)) = (
        params.client_id.as_deref().filter(|s| !s.is_empty()),
        params.redirect_uri.as_deref().filter(|s| !s.is_empty()),
        params.response_type.as_deref().filter(|s| !s.is_empty()),
    ) else {
        tracing::warn!("authorize request missing required parameters");
        return Err(OAuthError::InvalidRequest(
            "missing required parameters: client_id, redirect_uri, response_type".to_string(),
        )
        .into_response());
    };

    if response_type != "code" {
        tracing::warn!(response_type, "unsupported response_type");
        return Err(OAuthError::InvalidRequest(format!(
            "unsupported response_type: {response_type}, only \"code\" is supported"
        ))
        .into_response());
    }

    let client = match state.oauth.find_client(client_id).await {
        Ok(Some(c)) if c.is_active() => c,
        Ok(_) => {
            tracing::warn!(client_id, "unknown or inactive client");
            return Err(OAuthError::InvalidClient.into_response());
        }
        Err(e) => return Err(OAuthError::Server(e).into_response()),
    };

    let allowlist = match state.oauth.list_redirect_uris(&client.client_id).await {
        Ok(list) => list,
        Err(e) => return Err(OAuthError::Server(e).into_response()),
    };
    if !client.is_redirect_uri_allowed(&allowlist, redirect_uri) {
        tracing::warn!(client_id, redirect_uri, "redirect_uri not in allowlist");
        return Err(OAuthError::InvalidRedirectUri.into_response());
    }

    let scope = ScopeSet::parse(params.scope.as_deref().unwrap_or(""));
    if !client.is_scope_allowed(&scope) {
        tracing::warn!(client_id, scope = %scope, "requested scope exceeds allowed scopes");
        return Err(error_redirect(
            redirect_uri,
            &OAuthError::InvalidScope,
            params.state.as_deref(),
        ));
    }

    Ok(AuthorizeContext {
        client,
        redirect_uri: redirect_uri.to_string(),
        scope,
        state: params.state.clone(),
    })
}

async fn issue_code_and_redirect(
    state: &AppState,
    user_id: &str,
    ctx: &AuthorizeContext,
) -> Response {
    let code = security::random_urlsafe(32);
    let now = OffsetDateTime::now_utc();
    let row = AuthorizationCode {
        code_hash: security::hash_token(&code),
        client_id: ctx.client.client_id.clone(),
        user_id: user_id.to_string(),
        redirect_uri: ctx.redirect_uri.clone(),
        scope: ctx.scope.to_string(),
        state: ctx.state.clone().unwrap_or_default(),
        expires_at: security::format_rfc3339(now + Duration::minutes(AUTH_CODE_TTL_MINUTES)),
        created_at: security::format_rfc3339(now),
        consumed_at: None,
    };
    if let Err(e) = state.oauth.insert_code(row).await {
        return OAuthError::Server(e).into_response();
    }

    tracing::info!(
        user_id,
        client_id = %ctx.client.client_id,
        scope = %ctx.scope,
        "authorization code issued"
    );
    let mut params = vec![("code", code)];
    if let Some(s) = ctx.state.as_deref().filter(|s| !s.is_empty()) {
        params.push(("state", s.to_string()));
    }
    redirect_with_params(&ctx.redirect_uri, &params)
}

/// OAuth error-redirect convention: error + error_description + state echo,
/// delivered to the already-validated redirect_uri.
fn error_redirect(redirect_uri: &str, err: &OAuthError, state: Option<&str>) -> Response {
    let mut params = vec![
        ("error", err.error_code().to_string()),
        ("error_description", err.public_description()),
    ];
    if let Some(s) = state.filter(|s| !s.is_empty()) {
        params.push(("state", s.to_string()));
    }
    redirect_with_params(redirect_uri, &params)
}

fn redirect_with_params(redirect_uri: &str, params: &[(&str, String)]) -> Response {
    match Url::parse(redirect_uri) {
        Ok(mut url) => {
            {
                let mut pairs = url.query_pairs_mut();
                for (k, v) in params {
                    pairs.append_pair(k, v);
                }
            }
            Redirect::temporary(url.as_str()).into_response()
        }
        // The allowlist should only ever hold absolute URIs; an unparseable
        // entry is a provisioning bug, not a redirect target.
        Err(_) => OAuthError::InvalidRedirectUri.into_response(),
    }
}

fn render_consent_page(ctx: &AuthorizeContext) -> String {
    let client_name = escape_html(&ctx.client.client_name);
    let client_description = escape_html(&ctx.client.client_description);
    let client_id = escape_html(&ctx.client.client_id);
    let redirect_uri = escape_html(&ctx.redirect_uri);
    let scope_value = escape_html(&ctx.scope.to_string());
    let state_value = escape_html(ctx.state.as_deref().unwrap_or(""));

    let scopes_html = if ctx.scope.is_empty() {
        "<p>No additional permissions requested.</p>".to_string()
    } else {
        let items: String = ctx
            .scope
            .descriptions()
            .iter()
            .map(|d| format!("<li>{}</li>", escape_html(d)))
            .collect();
        format!("<ul>{}</ul>", items)
    };

    format!(
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Authorize {client_name}</title>
  <style>
    body {{ font-family: system-ui, -apple-system, Segoe UI, Roboto, Ubuntu, Cantarell, Noto Sans, Helvetica, Arial, sans-serif; margin: 0; }}
    main {{ max-width: 560px; margin: 10vh auto; padding: 24px; border-radius: 12px; box-shadow: 0 10px 30px rgba(0,0,0,0.06); }}
    h1 {{ margin-top: 0; font-size: 24px; }}
    .scopes {{ margin: 16px 0; }}
    button {{ padding: 10px 16px; border-radius: 8px; border: 1px solid #ddd; background: #fff; cursor: pointer; }}
    button.primary {{ background: #111; color: #fff; border-color: #111; }}
    .actions {{ display: flex; gap: 12px; margin-top: 16px; }}
  </style>
</head>
<body>
  <main>
    <h1>Authorize {client_name}</h1>
    <p>{client_description}</p>
    <p>This application is requesting access to your calendar account.</p>
    <div class="scopes">
      {scopes_html}
    </div>
    <form method="post" action="/oauth/authorize">
      <input type="hidden" name="response_type" value="code" />
      <input type="hidden" name="client_id" value="{client_id}" />
      <input type="hidden" name="redirect_uri" value="{redirect_uri}" />
      <input type="hidden" name="scope" value="{scope}" />
      <input type="hidden" name="state" value="{state}" />
      <div class="actions">
        <button class="primary" name="action" value="authorize" type="submit">Authorize</button>
        <button name="action" value="deny" type="submit">Deny</button>
      </div>
    </form>
  </main>
</body>
</html>"#,
        client_name = client_name,
        client_description = client_description,
        scopes_html = scopes_html,
        client_id = client_id,
        redirect_uri = redirect_uri,
        scope = scope_value,
        state = state_value,
    )
}

pub(crate) fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
