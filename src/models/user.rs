use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Externally-owned identity row. The OAuth subsystem reads users to serve
/// userinfo and to bind codes/tokens; it never writes this table.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub provider: String,
    pub provider_openid: Option<String>,
    pub provider_unionid: Option<String>,
    pub avatar: Option<String>,
    pub created_at: String,
}

/// Provider link resolved once at user load, replacing ad-hoc
/// has-this-profile checks scattered over the response builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityLink {
    Qq { openid: String, unionid: Option<String> },
    AcWing { openid: String },
    None,
}

impl User {
    pub fn identity(&self) -> IdentityLink {
        match (self.provider.as_str(), self.provider_openid.as_deref()) {
            ("qq", Some(openid)) => IdentityLink::Qq {
                openid: openid.to_string(),
                unionid: self.provider_unionid.clone(),
            },
            ("acwing", Some(openid)) => IdentityLink::AcWing {
                openid: openid.to_string(),
            },
            _ => IdentityLink::None,
        }
    }

    /// Preferred display name, falling back to the login name.
    pub fn public_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}
