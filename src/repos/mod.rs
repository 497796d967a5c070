use async_trait::async_trait;

use crate::models::{
    access_token::OAuthAccessToken,
    auth_code::AuthorizationCode,
    client::{ClientRedirectUri, OAuthClient},
    user::User,
};

/// Outcome of the atomic code-redemption transaction. Exactly one
/// concurrent redemption of a code can observe `Redeemed`; every other
/// attempt sees one of the rejection variants. All rejections collapse to
/// `invalid_grant` on the wire; the variant is for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeRedemption {
    /// The code was marked consumed and the token row inserted, as one unit.
    Redeemed(AuthorizationCode),
    NotFound,
    AlreadyUsed,
    Expired,
    WrongClient,
    RedirectMismatch,
}

impl CodeRedemption {
    pub fn rejection_reason(&self) -> Option<&'static str> {
        match self {
            CodeRedemption::Redeemed(_) => None,
            CodeRedemption::NotFound => Some("code not found"),
            CodeRedemption::AlreadyUsed => Some("code already used"),
            CodeRedemption::Expired => Some("code expired"),
            CodeRedemption::WrongClient => Some("code belongs to a different client"),
            CodeRedemption::RedirectMismatch => Some("redirect_uri does not match the code"),
        }
    }
}

/// Storage capability set of the OAuth subsystem: find, insert, and
/// conditional update. Handlers only see this trait; the concrete backend
/// is chosen at startup.
#[async_trait]
pub trait OAuthRepo: Send + Sync {
    // Client registry (read-mostly; writes are administrative provisioning)
    async fn find_client(&self, client_id: &str) -> anyhow::Result<Option<OAuthClient>>;
    async fn list_redirect_uris(&self, client_id: &str) -> anyhow::Result<Vec<ClientRedirectUri>>;
    async fn insert_client(
        &self,
        client: OAuthClient,
        redirect_uris: Vec<String>,
    ) -> anyhow::Result<()>;

    // Users are externally owned; read-only here
    async fn find_user(&self, user_id: &str) -> anyhow::Result<Option<User>>;

    // Authorization codes
    async fn insert_code(&self, code: AuthorizationCode) -> anyhow::Result<()>;
    /// Plain read, used to learn the code's bindings before minting the
    /// replacement token. Never treat this as the validity check; only
    /// [`redeem_code`](OAuthRepo::redeem_code) decides that, atomically.
    async fn find_code(&self, code_hash: &str) -> anyhow::Result<Option<AuthorizationCode>>;
    /// Check-and-set redemption: validates the code against the
    /// authenticated client and presented redirect_uri, marks it consumed,
    /// and inserts the freshly minted token row, all in one transaction.
    async fn redeem_code(
        &self,
        code_hash: &str,
        client_id: &str,
        redirect_uri: &str,
        token: OAuthAccessToken,
    ) -> anyhow::Result<CodeRedemption>;
    async fn delete_expired_codes(&self) -> anyhow::Result<usize>;

    // Access tokens
    async fn find_token_by_hash(&self, token_hash: &str)
        -> anyhow::Result<Option<OAuthAccessToken>>;
    async fn find_token_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
        client_id: &str,
    ) -> anyhow::Result<Option<OAuthAccessToken>>;
    /// Rotation: revoke the old row and insert its replacement in one
    /// transaction. Returns false (and inserts nothing) when the old row
    /// was already revoked by a concurrent rotation or revocation.
    async fn rotate_token(
        &self,
        old_token_id: &str,
        new_token: OAuthAccessToken,
    ) -> anyhow::Result<bool>;
    /// Conditional update; returns how many rows flipped to revoked (0 when
    /// the token was already revoked).
    async fn revoke_token(&self, token_id: &str) -> anyhow::Result<usize>;
    async fn revoke_all_for_client(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> anyhow::Result<usize>;
    async fn find_active_token_for_client(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> anyhow::Result<Option<OAuthAccessToken>>;
    async fn list_active_tokens_for_user(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Vec<OAuthAccessToken>>;
    /// Best-effort bookkeeping; failures are logged, never surfaced.
    async fn touch_token_last_used(&self, token_id: &str) -> anyhow::Result<()>;
    /// Hard-deletes token rows whose expiry is older than the retention
    /// window, keeping the store from growing without bound.
    async fn delete_tokens_expired_for(&self, retention_days: i64) -> anyhow::Result<usize>;
}

pub mod sqlite;
