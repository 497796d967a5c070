use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::security;

/// One-time authorization code binding {client, user, redirect_uri, scope,
/// state}. The code itself is returned to the client on the consent
/// redirect; only its digest is stored. `consumed_at` flips exactly once
/// inside the redemption transaction and is never cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(primary_key(code_hash))]
#[diesel(table_name = crate::schema::oauth_codes)]
pub struct AuthorizationCode {
    pub code_hash: String,
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub expires_at: String,
    pub created_at: String,
    pub consumed_at: Option<String>,
}

impl AuthorizationCode {
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        security::is_past(&self.expires_at, now)
    }
}
