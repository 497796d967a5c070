#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt; // for oneshot
use tower_cookies::Key;

use ralendar_oauth::app::{build_router, AppState};
use ralendar_oauth::auth::session::SESSION_COOKIE;
use ralendar_oauth::config::{AppConfig, DbCfg, OAuthCfg, ServerCfg};
use ralendar_oauth::db::{self, SqlitePool};
use ralendar_oauth::models::client::OAuthClient;
use ralendar_oauth::repos::{sqlite::SqliteOAuthRepo, OAuthRepo};
use ralendar_oauth::security;

pub const TEST_SIGNING_SECRET: &str = "test-signing-secret";

pub struct TestApp {
    pub _dir: TempDir,
    pub pool: SqlitePool,
    pub state: AppState,
    pub router: Router,
    pub oauth: Arc<dyn OAuthRepo>,
}

pub fn test_config() -> AppConfig {
    use base64::Engine as _;
    AppConfig {
        server: ServerCfg {
            bind_addr: "127.0.0.1:0".into(),
            cookie_key_base64: base64::engine::general_purpose::STANDARD.encode([42u8; 64]),
        },
        db: DbCfg { url: String::new() },
        oauth: OAuthCfg {
            signing_secret: TEST_SIGNING_SECRET.into(),
            access_token_ttl_secs: 7200,
            retention_days: 7,
        },
    }
}

pub fn spawn_app() -> anyhow::Result<TestApp> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("test.sqlite").display().to_string();

    let pool = db::make_pool(&db_path)?;
    {
        let mut conn = pool.get()?;
        db::run_migrations(&mut conn)?;
    }

    let mut config = test_config();
    config.db.url = db_path;
    let oauth: Arc<dyn OAuthRepo> = SqliteOAuthRepo::new(pool.clone());
    let state = AppState::new(config, oauth.clone())?;
    let router = build_router(state.clone());

    Ok(TestApp { _dir: dir, pool, state, router, oauth })
}

/// Register a client with the given secret, allowed scopes, and redirect
/// allowlist, the way administrative provisioning would.
pub async fn seed_client(
    app: &TestApp,
    client_id: &str,
    client_secret: &str,
    allowed_scopes: &str,
    redirect_uris: &[&str],
) -> anyhow::Result<()> {
    let now = security::format_rfc3339(OffsetDateTime::now_utc());
    let client = OAuthClient {
        client_id: client_id.to_string(),
        client_secret_hash: security::hash_client_secret(client_secret)?,
        client_name: format!("{client_id} app"),
        client_description: format!("test client {client_id}"),
        logo_url: None,
        website_url: None,
        allowed_scopes: allowed_scopes.to_string(),
        is_active: 1,
        created_at: now.clone(),
        updated_at: now,
    };
    app.oauth
        .insert_client(client, redirect_uris.iter().map(|s| s.to_string()).collect())
        .await
}

/// Register a client with generated credentials, the way the
/// `provision_client` binary does, and hand back the one-time secret.
pub async fn provision_client(
    app: &TestApp,
    client_name: &str,
    allowed_scopes: &str,
    redirect_uris: &[&str],
) -> anyhow::Result<(String, String)> {
    let (client_id, client_secret) = security::generate_client_credentials();
    let now = security::format_rfc3339(OffsetDateTime::now_utc());
    let client = OAuthClient {
        client_id: client_id.clone(),
        client_secret_hash: security::hash_client_secret(&client_secret)?,
        client_name: client_name.to_string(),
        client_description: String::new(),
        logo_url: None,
        website_url: None,
        allowed_scopes: allowed_scopes.to_string(),
        is_active: 1,
        created_at: now.clone(),
        updated_at: now,
    };
    app.oauth
        .insert_client(client, redirect_uris.iter().map(|s| s.to_string()).collect())
        .await?;
    Ok((client_id, client_secret))
}

/// Users are owned by the account subsystem; tests create them with a raw
/// insert, the same way that subsystem would.
pub fn seed_user(app: &TestApp, user_id: &str, username: &str) -> anyhow::Result<()> {
    use diesel::prelude::*;
    use ralendar_oauth::schema::users::dsl as u;
    let mut conn = app.pool.get()?;
    diesel::insert_into(u::users)
        .values((
            u::id.eq(user_id),
            u::username.eq(username),
            u::provider.eq("email"),
            u::email.eq(format!("{username}@example.com")),
            u::created_at.eq(security::format_rfc3339(OffsetDateTime::now_utc())),
        ))
        .execute(&mut conn)?;
    Ok(())
}

pub fn seed_qq_user(app: &TestApp, user_id: &str, username: &str, openid: &str) -> anyhow::Result<()> {
    use diesel::prelude::*;
    use ralendar_oauth::schema::users::dsl as u;
    let mut conn = app.pool.get()?;
    diesel::insert_into(u::users)
        .values((
            u::id.eq(user_id),
            u::username.eq(username),
            u::provider.eq("qq"),
            u::provider_openid.eq(openid),
            u::provider_unionid.eq("union-1"),
            u::email.eq(format!("{username}@example.com")),
            u::created_at.eq(security::format_rfc3339(OffsetDateTime::now_utc())),
        ))
        .execute(&mut conn)?;
    Ok(())
}

/// Cookie header value for an externally established login session.
pub fn login_cookie(key: &Key, user_id: &str) -> String {
    let exp = OffsetDateTime::now_utc().unix_timestamp() + 3600;
    let payload = serde_json::json!({ "user_id": user_id, "exp": exp }).to_string();
    let mut jar = tower_cookies::cookie::CookieJar::new();
    jar.private_mut(key)
        .add(tower_cookies::cookie::Cookie::new(SESSION_COOKIE, payload));
    let sealed = jar.get(SESSION_COOKIE).expect("sealed session cookie");
    format!("{}={}", SESSION_COOKIE, sealed.value())
}

pub fn form_body(pairs: &[(&str, &str)]) -> String {
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        ser.append_pair(k, v);
    }
    ser.finish()
}

pub async fn send(router: &Router, req: Request<Body>) -> Response<Body> {
    router.clone().oneshot(req).await.expect("infallible")
}

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn get_with_bearer(router: &Router, uri: &str, bearer: &str) -> Response<Body> {
    send(
        router,
        Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

pub async fn post_form(router: &Router, uri: &str, pairs: &[(&str, &str)]) -> Response<Body> {
    send(
        router,
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form_body(pairs)))
            .unwrap(),
    )
    .await
}

pub async fn post_json_with_bearer(
    router: &Router,
    uri: &str,
    bearer: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(
        router,
        Request::post(uri)
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

pub async fn body_json(res: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_string(res: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8_lossy(&bytes).to_string()
}

pub fn location(res: &Response<Body>) -> String {
    res.headers()
        .get(header::LOCATION)
        .expect("Location header")
        .to_str()
        .unwrap()
        .to_string()
}

/// Query parameters of a redirect Location, for asserting on code/state/error.
pub fn location_params(res: &Response<Body>) -> std::collections::HashMap<String, String> {
    let loc = location(res);
    let url = url::Url::parse(&loc).expect("absolute redirect target");
    url.query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Run the consent flow to completion for a logged-in user and return the
/// authorization code from the redirect.
pub async fn obtain_code(
    app: &TestApp,
    user_id: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
) -> String {
    let cookie = login_cookie(&app.state.cookie_key, user_id);
    let body = form_body(&[
        ("response_type", "code"),
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("scope", scope),
        ("state", state),
        ("action", "authorize"),
    ]);
    let res = send(
        &app.router,
        Request::post("/oauth/authorize")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT, "consent should redirect");
    let params = location_params(&res);
    params.get("code").expect("code param in redirect").clone()
}

/// Exchange an authorization code at the token endpoint.
pub async fn exchange_code(
    app: &TestApp,
    code: &str,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
) -> Response<Body> {
    post_form(
        &app.router,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
        ],
    )
    .await
}

/// Full happy path: consent then exchange; returns (access_token, refresh_token).
pub async fn issue_token_pair(
    app: &TestApp,
    user_id: &str,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
    scope: &str,
) -> (String, String) {
    let code = obtain_code(app, user_id, client_id, redirect_uri, scope, "").await;
    let res = exchange_code(app, &code, client_id, client_secret, redirect_uri).await;
    assert_eq!(res.status(), StatusCode::OK, "token exchange should succeed");
    let json = body_json(res).await;
    (
        json["access_token"].as_str().unwrap().to_string(),
        json["refresh_token"].as_str().unwrap().to_string(),
    )
}

pub fn count_codes(app: &TestApp) -> i64 {
    use diesel::prelude::*;
    use ralendar_oauth::schema::oauth_codes::dsl as oc;
    let mut conn = app.pool.get().unwrap();
    oc::oauth_codes.count().get_result(&mut conn).unwrap()
}

pub fn count_tokens(app: &TestApp) -> i64 {
    use diesel::prelude::*;
    use ralendar_oauth::schema::oauth_access_tokens::dsl as at;
    let mut conn = app.pool.get().unwrap();
    at::oauth_access_tokens.count().get_result(&mut conn).unwrap()
}

/// Force the stored expiry of the access token row identified by its bearer
/// string into the past.
pub fn expire_token(app: &TestApp, access_token: &str) {
    use diesel::prelude::*;
    use ralendar_oauth::schema::oauth_access_tokens::dsl as at;
    let hash = security::hash_token(access_token);
    let past = security::format_rfc3339(OffsetDateTime::now_utc() - time::Duration::hours(1));
    let mut conn = app.pool.get().unwrap();
    diesel::update(at::oauth_access_tokens.filter(at::token_hash.eq(&hash)))
        .set(at::expires_at.eq(&past))
        .execute(&mut conn)
        .unwrap();
}
