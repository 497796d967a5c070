use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::security;

/// Bearer token row. The bearer string handed to the client is a signed
/// token; only digests of it and of the paired refresh token are stored.
/// `revoked_at` is irreversible once set; refresh rotates by revoking the
/// old row and inserting a new one, never by extending expiry.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::oauth_access_tokens)]
pub struct OAuthAccessToken {
    pub id: String,
    pub token_hash: String,
    pub refresh_token_hash: Option<String>,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub expires_at: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub revoked_at: Option<String>,
}

impl OAuthAccessToken {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        security::is_past(&self.expires_at, now)
    }
}
