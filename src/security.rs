use argon2::password_hash::{rand_core::OsRng as ArgonOsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::Engine as _;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Claims embedded in issued access tokens. The token is still looked up in
/// the store on every request; the signature only proves the string came
/// from us before we spend a database round trip on it.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub client_id: String,
    pub scope: String,
    pub jti: String,
    pub exp: usize,
}

pub fn hash_client_secret(raw: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut ArgonOsRng);
    let hash = Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("hash client secret: {e}"))?;
    Ok(hash.to_string())
}

/// Salted, constant-time verification via the PHC verifier.
pub fn verify_client_secret(stored_hash: &str, candidate: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok()
}

pub fn mint_access_token(
    signing_secret: &str,
    user_id: &str,
    client_id: &str,
    scope: &str,
    token_id: &str,
    expires_at: OffsetDateTime,
) -> anyhow::Result<String> {
    let claims = AccessTokenClaims {
        sub: user_id.to_string(),
        client_id: client_id.to_string(),
        scope: scope.to_string(),
        jti: token_id.to_string(),
        exp: expires_at.unix_timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(signing_secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify_access_token(signing_secret: &str, token: &str) -> Option<AccessTokenClaims> {
    decode::<AccessTokenClaims>(
        token,
        &DecodingKey::from_secret(signing_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

/// Url-safe random string with `bytes` bytes of entropy.
pub fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Credentials for administrative client provisioning.
pub fn generate_client_credentials() -> (String, String) {
    let client_id = format!("ralendar_client_{}", random_urlsafe(16));
    let client_secret = random_urlsafe(32);
    (client_id, client_secret)
}

/// Digest used for at-rest storage of codes and tokens.
pub fn hash_token(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn format_rfc3339(dt: OffsetDateTime) -> String {
    dt.format(&Rfc3339).unwrap_or_else(|_| dt.to_string())
}

/// True when `timestamp` is strictly before `now`. Unparseable timestamps
/// are treated as past (fail closed).
pub fn is_past(timestamp: &str, now: OffsetDateTime) -> bool {
    match OffsetDateTime::parse(timestamp, &Rfc3339) {
        Ok(t) => now > t,
        Err(_) => true,
    }
}
