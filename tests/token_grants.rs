mod common;

use axum::http::StatusCode;
use common::*;
use time::{Duration, OffsetDateTime};

use ralendar_oauth::security;

const ACME_ID: &str = "acme";
const ACME_SECRET: &str = "acme-secret";
const ACME_CB: &str = "https://acme.example/cb";
const ACME_CB2: &str = "https://acme.example/cb2";

async fn acme_app() -> TestApp {
    let app = spawn_app().expect("app");
    seed_client(
        &app,
        ACME_ID,
        ACME_SECRET,
        "calendar:read calendar:write user:read",
        &[ACME_CB, ACME_CB2],
    )
    .await
    .expect("client");
    seed_user(&app, "user-1", "alice").expect("user");
    app
}

#[tokio::test]
async fn code_exchange_returns_a_complete_token_pair() {
    let app = acme_app().await;
    let code = obtain_code(&app, "user-1", ACME_ID, ACME_CB, "calendar:read user:read", "").await;

    let res = exchange_code(&app, &code, ACME_ID, ACME_SECRET, ACME_CB).await;
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(json["expires_in"], 7200);
    assert_eq!(json["scope"], "calendar:read user:read");
    assert!(!json["access_token"].as_str().unwrap().is_empty());
    assert!(json["refresh_token"].as_str().unwrap().len() >= 43);
    assert_eq!(count_tokens(&app), 1);
}

#[tokio::test]
async fn code_is_single_use() {
    let app = acme_app().await;
    let code = obtain_code(&app, "user-1", ACME_ID, ACME_CB, "calendar:read", "").await;

    let first = exchange_code(&app, &code, ACME_ID, ACME_SECRET, ACME_CB).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = exchange_code(&app, &code, ACME_ID, ACME_SECRET, ACME_CB).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(second).await["error"], "invalid_grant");
    assert_eq!(count_tokens(&app), 1);
}

#[tokio::test]
async fn redirect_uri_must_match_the_one_bound_at_issuance() {
    let app = acme_app().await;
    let code = obtain_code(&app, "user-1", ACME_ID, ACME_CB, "calendar:read", "").await;

    // ACME_CB2 is on the allowlist, but the code was issued for ACME_CB.
    let res = exchange_code(&app, &code, ACME_ID, ACME_SECRET, ACME_CB2).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "invalid_grant");
    assert_eq!(count_tokens(&app), 0);
}

#[tokio::test]
async fn code_bound_to_issuing_client_only() {
    let app = acme_app().await;
    seed_client(&app, "other", "other-secret", "calendar:read", &[ACME_CB])
        .await
        .expect("client");
    let code = obtain_code(&app, "user-1", ACME_ID, ACME_CB, "calendar:read", "").await;

    let res = exchange_code(&app, &code, "other", "other-secret", ACME_CB).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "invalid_grant");
    assert_eq!(count_tokens(&app), 0);
}

#[tokio::test]
async fn wrong_client_secret_is_invalid_client() {
    let app = acme_app().await;
    let code = obtain_code(&app, "user-1", ACME_ID, ACME_CB, "calendar:read", "").await;

    let res = exchange_code(&app, &code, ACME_ID, "wrong-secret", ACME_CB).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(res).await["error"], "invalid_client");

    // The code must survive a failed authentication attempt.
    let retry = exchange_code(&app, &code, ACME_ID, ACME_SECRET, ACME_CB).await;
    assert_eq!(retry.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_grant_type_is_rejected() {
    let app = acme_app().await;
    let res = post_form(
        &app.router,
        "/oauth/token",
        &[("grant_type", "client_credentials")],
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn missing_grant_parameters_are_invalid_request() {
    let app = acme_app().await;
    let res = post_form(
        &app.router,
        "/oauth/token",
        &[("grant_type", "authorization_code"), ("code", "abc")],
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "invalid_request");

    let res = post_form(&app.router, "/oauth/token", &[("code", "abc")]).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "invalid_request");
}

#[tokio::test]
async fn expired_code_is_invalid_grant() {
    let app = acme_app().await;

    // Plant a code whose expiry is already in the past.
    let code = security::random_urlsafe(32);
    {
        use diesel::prelude::*;
        use ralendar_oauth::schema::oauth_codes::dsl as oc;
        let now = OffsetDateTime::now_utc();
        let mut conn = app.pool.get().unwrap();
        diesel::insert_into(oc::oauth_codes)
            .values((
                oc::code_hash.eq(security::hash_token(&code)),
                oc::client_id.eq(ACME_ID),
                oc::user_id.eq("user-1"),
                oc::redirect_uri.eq(ACME_CB),
                oc::scope.eq("calendar:read"),
                oc::state.eq(""),
                oc::expires_at.eq(security::format_rfc3339(now - Duration::minutes(1))),
                oc::created_at.eq(security::format_rfc3339(now - Duration::minutes(11))),
            ))
            .execute(&mut conn)
            .unwrap();
    }

    let res = exchange_code(&app, &code, ACME_ID, ACME_SECRET, ACME_CB).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "invalid_grant");
    assert_eq!(count_tokens(&app), 0);
}

#[tokio::test]
async fn concurrent_redemptions_have_exactly_one_winner() {
    let app = acme_app().await;
    let code = obtain_code(&app, "user-1", ACME_ID, ACME_CB, "calendar:read", "").await;

    let attempts = (0..4).map(|_| exchange_code(&app, &code, ACME_ID, ACME_SECRET, ACME_CB));
    let results = futures::future::join_all(attempts).await;

    let winners = results
        .iter()
        .filter(|r| r.status() == StatusCode::OK)
        .count();
    assert_eq!(winners, 1, "exactly one redemption may succeed");
    for res in results {
        if res.status() != StatusCode::OK {
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        }
    }
    assert_eq!(count_tokens(&app), 1, "the losers must not mint tokens");
}

#[tokio::test]
async fn refresh_rotates_the_pair_and_revokes_the_old_one() {
    let app = acme_app().await;
    let (old_access, old_refresh) =
        issue_token_pair(&app, "user-1", ACME_ID, ACME_SECRET, ACME_CB, "calendar:read user:read")
            .await;

    let old_userinfo = get_with_bearer(&app.router, "/oauth/userinfo", &old_access).await;
    assert_eq!(old_userinfo.status(), StatusCode::OK);

    let res = post_form(
        &app.router,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &old_refresh),
            ("client_id", ACME_ID),
            ("client_secret", ACME_SECRET),
        ],
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["scope"], "calendar:read user:read", "scope carries over unchanged");
    let new_access = json["access_token"].as_str().unwrap();
    assert_ne!(new_access, old_access);

    // Old pair is dead, new access token works.
    let res = get_with_bearer(&app.router, "/oauth/userinfo", &old_access).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let res = get_with_bearer(&app.router, "/oauth/userinfo", new_access).await;
    assert_eq!(res.status(), StatusCode::OK);

    // Replaying the rotated refresh token fails.
    let res = post_form(
        &app.router,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &old_refresh),
            ("client_id", ACME_ID),
            ("client_secret", ACME_SECRET),
        ],
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "invalid_grant");
}

#[tokio::test]
async fn refresh_works_after_the_access_token_expires() {
    let app = acme_app().await;
    let (access, refresh) =
        issue_token_pair(&app, "user-1", ACME_ID, ACME_SECRET, ACME_CB, "calendar:read").await;
    expire_token(&app, &access);

    let gate = get_with_bearer(&app.router, "/oauth/userinfo", &access).await;
    assert_eq!(gate.status(), StatusCode::UNAUTHORIZED);

    let res = post_form(
        &app.router,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh),
            ("client_id", ACME_ID),
            ("client_secret", ACME_SECRET),
        ],
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK, "refresh has no expiry of its own");
}

#[tokio::test]
async fn refresh_token_is_bound_to_its_client() {
    let app = acme_app().await;
    seed_client(&app, "other", "other-secret", "calendar:read", &[ACME_CB])
        .await
        .expect("client");
    let (_, refresh) =
        issue_token_pair(&app, "user-1", ACME_ID, ACME_SECRET, ACME_CB, "calendar:read").await;

    let res = post_form(
        &app.router,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh),
            ("client_id", "other"),
            ("client_secret", "other-secret"),
        ],
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "invalid_grant");
}

#[tokio::test]
async fn provisioned_credentials_complete_the_full_grant() {
    let app = spawn_app().expect("app");
    seed_user(&app, "user-1", "alice").expect("user");
    let (client_id, client_secret) =
        provision_client(&app, "Acme Calendar", "calendar:read", &[ACME_CB])
            .await
            .expect("provision");
    assert!(client_id.starts_with("ralendar_client_"));

    let code = obtain_code(&app, "user-1", &client_id, ACME_CB, "calendar:read", "").await;
    let res = exchange_code(&app, &code, &client_id, &client_secret, ACME_CB).await;
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["scope"], "calendar:read");
}

#[tokio::test]
async fn unknown_refresh_token_is_invalid_grant() {
    let app = acme_app().await;
    let res = post_form(
        &app.router,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", "no-such-token"),
            ("client_id", ACME_ID),
            ("client_secret", ACME_SECRET),
        ],
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "invalid_grant");
}
