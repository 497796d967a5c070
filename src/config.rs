use base64::Engine as _;
use rand::RngCore;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerCfg {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Base64-encoded 32- or 64-byte key used to sign/encrypt the login
    /// session cookie the authorize endpoint consumes.
    pub cookie_key_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbCfg {
    /// Path to the sqlite database file, e.g. `ralendar.db`.
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCfg {
    /// HS256 secret for access-token integrity.
    pub signing_secret: String,
    /// Access-token lifetime in seconds.
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_secs: i64,
    /// Expired tokens are hard-deleted once older than this window.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerCfg,
    pub db: DbCfg,
    pub oauth: OAuthCfg,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_access_token_ttl() -> i64 {
    7200
}
fn default_retention_days() -> i64 {
    7
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(config::Environment::default().separator("_"))
            .build()?;

        // Map flat env names to the nested structure for convenience:
        // APP_BIND_ADDR, COOKIE_KEY_BASE64, DATABASE_URL,
        // OAUTH_SIGNING_SECRET, OAUTH_ACCESS_TOKEN_TTL_SECS
        let mut server = settings.get::<ServerCfg>("server").unwrap_or(ServerCfg {
            bind_addr: std::env::var("APP_BIND_ADDR").unwrap_or_else(|_| default_bind_addr()),
            cookie_key_base64: std::env::var("COOKIE_KEY_BASE64").unwrap_or_default(),
        });
        if server.cookie_key_base64.is_empty() {
            // Generate a dev key and keep it in-memory only
            let mut key = [0u8; 64];
            rand::rngs::OsRng.fill_bytes(&mut key);
            server.cookie_key_base64 = base64::engine::general_purpose::STANDARD.encode(key);
            tracing::warn!(
                "COOKIE_KEY_BASE64 not provided; generated a temporary dev key. Sessions will be invalidated on restart."
            );
        }

        let db = settings
            .get::<DbCfg>("db")
            .unwrap_or(DbCfg { url: std::env::var("DATABASE_URL")? });

        let mut oauth = settings.get::<OAuthCfg>("oauth").unwrap_or(OAuthCfg {
            signing_secret: std::env::var("OAUTH_SIGNING_SECRET").unwrap_or_default(),
            access_token_ttl_secs: std::env::var("OAUTH_ACCESS_TOKEN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_access_token_ttl),
            retention_days: default_retention_days(),
        });
        if oauth.signing_secret.is_empty() {
            let mut key = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut key);
            oauth.signing_secret = base64::engine::general_purpose::STANDARD.encode(key);
            tracing::warn!(
                "OAUTH_SIGNING_SECRET not provided; generated a temporary dev secret. Issued tokens will be invalidated on restart."
            );
        }
        if oauth.access_token_ttl_secs <= 0 {
            anyhow::bail!(
                "OAUTH_ACCESS_TOKEN_TTL_SECS must be positive, got {}",
                oauth.access_token_ttl_secs
            );
        }

        Ok(AppConfig { server, db, oauth })
    }
}

pub fn decode_cookie_key(b64: &str) -> anyhow::Result<[u8; 64]> {
    // tower-cookies expects a 64-byte key for Private (32 for signing + 32 for encryption)
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid COOKIE_KEY_BASE64: {}", e))?;
    if bytes.len() == 32 {
        // If the operator supplied 32 bytes, duplicate to make 64 (sign + encrypt)
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&bytes);
        out[32..].copy_from_slice(&bytes);
        return Ok(out);
    }
    if bytes.len() != 64 {
        return Err(anyhow::anyhow!(
            "COOKIE_KEY_BASE64 must decode to 32 or 64 bytes, got {}",
            bytes.len()
        ));
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&bytes);
    Ok(out)
}
