//! Login-session cookie consumed by the authorize endpoint.
//!
//! Establishing, refreshing, and clearing the session is the login
//! collaborator's job; the OAuth core only reads the cookie to ask
//! "is a user present".

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_cookies::Cookies;

pub const SESSION_COOKIE: &str = "sid";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub exp: Option<i64>, // unix seconds
}

pub fn get_session(cookies: &Cookies, key: &tower_cookies::Key) -> Option<Session> {
    let c = cookies.private(key).get(SESSION_COOKIE)?;
    let session: Session = serde_json::from_slice(c.value().as_bytes()).ok()?;
    if let Some(exp) = session.exp {
        if OffsetDateTime::now_utc().unix_timestamp() > exp {
            return None;
        }
    }
    Some(session)
}
