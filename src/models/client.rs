use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::scopes::ScopeSet;

/// A registered third-party application.
///
/// Rows are written by administrative provisioning only; the authorization
/// server treats the registry as read-mostly. `allowed_scopes` and the
/// redirect-URI allowlist are closed sets: anything outside them is rejected
/// before a code is issued.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable, AsChangeset)]
#[diesel(primary_key(client_id))]
#[diesel(table_name = crate::schema::oauth_clients)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret_hash: String,
    pub client_name: String,
    pub client_description: String,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub allowed_scopes: String,
    pub is_active: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = crate::schema::oauth_client_redirect_uris)]
pub struct ClientRedirectUri {
    pub id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub created_at: String,
}

impl OAuthClient {
    pub fn is_active(&self) -> bool {
        self.is_active == 1
    }

    /// Exact string match against the allowlist. Prefix or substring
    /// matching here would reopen the redirect-interception hole this
    /// check exists to close.
    pub fn is_redirect_uri_allowed(&self, allowlist: &[ClientRedirectUri], uri: &str) -> bool {
        allowlist.iter().any(|r| r.redirect_uri == uri)
    }

    /// Every requested scope token must be in the client's allowed set.
    /// An empty request is the empty set and is always allowed.
    pub fn is_scope_allowed(&self, requested: &ScopeSet) -> bool {
        requested.is_subset(&ScopeSet::parse(&self.allowed_scopes))
    }
}
