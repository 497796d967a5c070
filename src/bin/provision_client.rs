//! Administrative one-shot: register an OAuth client and print its
//! freshly generated credentials. The secret is shown exactly once; only
//! its argon2 hash is stored.
//!
//! Usage: provision_client <client_name> <redirect_uri>... [--scopes "<scopes>"]

use std::sync::Arc;

use time::OffsetDateTime;

use ralendar_oauth::config::AppConfig;
use ralendar_oauth::db;
use ralendar_oauth::models::client::OAuthClient;
use ralendar_oauth::repos::{sqlite::SqliteOAuthRepo, OAuthRepo};
use ralendar_oauth::security;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(client_name) = args.next() else {
        eprintln!("usage: provision_client <client_name> <redirect_uri>... [--scopes \"<scopes>\"]");
        std::process::exit(2);
    };
    let mut redirect_uris = Vec::new();
    let mut allowed_scopes = String::new();
    while let Some(arg) = args.next() {
        if arg == "--scopes" {
            allowed_scopes = args.next().unwrap_or_default();
        } else {
            redirect_uris.push(arg);
        }
    }
    if redirect_uris.is_empty() {
        eprintln!("at least one redirect_uri is required");
        std::process::exit(2);
    }

    let config = AppConfig::load()?;
    let pool = db::make_pool(&config.db.url)?;
    {
        let mut conn = pool.get()?;
        db::run_migrations(&mut conn)?;
    }
    let repo: Arc<dyn OAuthRepo> = SqliteOAuthRepo::new(pool);

    let (client_id, client_secret) = security::generate_client_credentials();
    let now = security::format_rfc3339(OffsetDateTime::now_utc());
    let client = OAuthClient {
        client_id: client_id.clone(),
        client_secret_hash: security::hash_client_secret(&client_secret)?,
        client_name,
        client_description: String::new(),
        logo_url: None,
        website_url: None,
        allowed_scopes,
        is_active: 1,
        created_at: now.clone(),
        updated_at: now,
    };
    repo.insert_client(client, redirect_uris).await?;

    println!("client_id: {client_id}");
    println!("client_secret: {client_secret}");
    println!("store the secret now; it is not recoverable later");
    Ok(())
}
