use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_cookies::{CookieManagerLayer, Key};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crate::config::{decode_cookie_key, AppConfig};
use crate::repos::OAuthRepo;
use crate::web::handlers::{apps, authorize, revoke, token, userinfo};

const CLEANUP_INTERVAL_SECS: u64 = 3600;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub cookie_key: Key,
    pub oauth: Arc<dyn OAuthRepo>,
}

impl AppState {
    pub fn new(config: AppConfig, oauth: Arc<dyn OAuthRepo>) -> anyhow::Result<Self> {
        let key_bytes = decode_cookie_key(&config.server.cookie_key_base64)?;
        Ok(Self {
            config,
            cookie_key: Key::from(&key_bytes),
            oauth,
        })
    }
}

pub async fn run() -> anyhow::Result<()> {
    // logging
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let config = AppConfig::load()?;

    let pool = crate::db::make_pool(&config.db.url)?;
    {
        let mut conn = pool.get()?;
        crate::db::run_migrations(&mut conn)?;
    }

    let oauth: Arc<dyn OAuthRepo> = crate::repos::sqlite::SqliteOAuthRepo::new(pool);
    let state = AppState::new(config.clone(), oauth.clone())?;

    spawn_retention_cleanup(oauth, config.oauth.retention_days);

    let app = build_router(state);

    let addr = config.server.bind_addr.clone();
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/oauth/authorize",
            get(authorize::authorize_get).post(authorize::authorize_post),
        )
        .route("/oauth/token", post(token::token))
        .route("/oauth/userinfo", get(userinfo::userinfo))
        .route("/oauth/revoke", post(revoke::revoke))
        .route("/oauth/authorized-apps", get(apps::authorized_apps))
        .with_state(state)
        .layer(CookieManagerLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Expired codes and tokens past the retention window are hard-deleted so
/// the store does not grow without bound. Rows inside the window are kept
/// for audit; correctness never depends on this job running.
fn spawn_retention_cleanup(oauth: Arc<dyn OAuthRepo>, retention_days: i64) {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            match oauth.delete_expired_codes().await {
                Ok(n) if n > 0 => tracing::info!(count = n, "cleaned up expired authorization codes"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = ?e, "authorization code cleanup failed"),
            }
            match oauth.delete_tokens_expired_for(retention_days).await {
                Ok(n) if n > 0 => tracing::info!(count = n, "cleaned up expired access tokens"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = ?e, "access token cleanup failed"),
            }
        }
    });
}
