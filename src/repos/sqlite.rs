use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::OptionalExtension;
use time::{Duration, OffsetDateTime};

use crate::db::SqlitePool;
use crate::models::{
    access_token::OAuthAccessToken,
    auth_code::AuthorizationCode,
    client::{ClientRedirectUri, OAuthClient},
    user::User,
};
use crate::repos::{CodeRedemption, OAuthRepo};
use crate::schema::{
    oauth_access_tokens, oauth_client_redirect_uris, oauth_clients, oauth_codes, users,
};
use crate::security;

pub struct SqliteOAuthRepo {
    pool: SqlitePool,
}

impl SqliteOAuthRepo {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl OAuthRepo for SqliteOAuthRepo {
    async fn find_client(&self, client_id: &str) -> anyhow::Result<Option<OAuthClient>> {
        let client_id = client_id.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<OAuthClient>> {
            let mut conn = pool.get()?;
            let row = oauth_clients::table
                .find(&client_id)
                .first::<OAuthClient>(&mut conn)
                .optional()?;
            Ok(row)
        })
        .await?
    }

    async fn list_redirect_uris(
        &self,
        client_id: &str,
    ) -> anyhow::Result<Vec<ClientRedirectUri>> {
        let client_id = client_id.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<ClientRedirectUri>> {
            let mut conn = pool.get()?;
            let rows = oauth_client_redirect_uris::table
                .filter(oauth_client_redirect_uris::client_id.eq(&client_id))
                .order(oauth_client_redirect_uris::created_at.asc())
                .load::<ClientRedirectUri>(&mut conn)?;
            Ok(rows)
        })
        .await?
    }

    async fn insert_client(
        &self,
        client: OAuthClient,
        redirect_uris: Vec<String>,
    ) -> anyhow::Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut conn = pool.get()?;
            let now = security::format_rfc3339(OffsetDateTime::now_utc());
            conn.immediate_transaction(|conn| {
                diesel::insert_into(oauth_clients::table)
                    .values(&client)
                    .execute(conn)?;
                for uri in &redirect_uris {
                    diesel::insert_into(oauth_client_redirect_uris::table)
                        .values(&ClientRedirectUri {
                            id: uuid::Uuid::new_v4().to_string(),
                            client_id: client.client_id.clone(),
                            redirect_uri: uri.clone(),
                            created_at: now.clone(),
                        })
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await?
    }

    async fn find_user(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        let user_id = user_id.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<User>> {
            let mut conn = pool.get()?;
            let row = users::table.find(&user_id).first::<User>(&mut conn).optional()?;
            Ok(row)
        })
        .await?
    }

    async fn insert_code(&self, code: AuthorizationCode) -> anyhow::Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut conn = pool.get()?;
            diesel::insert_into(oauth_codes::table)
                .values(&code)
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    async fn find_code(&self, code_hash: &str) -> anyhow::Result<Option<AuthorizationCode>> {
        let code_hash = code_hash.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<AuthorizationCode>> {
            let mut conn = pool.get()?;
            let row = oauth_codes::table
                .find(&code_hash)
                .first::<AuthorizationCode>(&mut conn)
                .optional()?;
            Ok(row)
        })
        .await?
    }

    async fn redeem_code(
        &self,
        code_hash: &str,
        client_id: &str,
        redirect_uri: &str,
        token: OAuthAccessToken,
    ) -> anyhow::Result<CodeRedemption> {
        let code_hash = code_hash.to_string();
        let client_id = client_id.to_string();
        let redirect_uri = redirect_uri.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<CodeRedemption> {
            let mut conn = pool.get()?;
            let now = OffsetDateTime::now_utc();
            let now_str = security::format_rfc3339(now);
            // The immediate transaction takes the sqlite write lock up
            // front, so concurrent redemptions of the same code serialize
            // here and the loser observes consumed_at already set.
            conn.immediate_transaction(|conn| {
                use oauth_codes::dsl as oc;
                let row = oc::oauth_codes
                    .filter(oc::code_hash.eq(&code_hash))
                    .first::<AuthorizationCode>(conn)
                    .optional()?;
                let Some(row) = row else {
                    return Ok(CodeRedemption::NotFound);
                };
                if row.is_consumed() {
                    return Ok(CodeRedemption::AlreadyUsed);
                }
                if row.is_expired(now) {
                    return Ok(CodeRedemption::Expired);
                }
                if row.client_id != client_id {
                    return Ok(CodeRedemption::WrongClient);
                }
                if row.redirect_uri != redirect_uri {
                    return Ok(CodeRedemption::RedirectMismatch);
                }
                let updated = diesel::update(
                    oc::oauth_codes
                        .filter(oc::code_hash.eq(&code_hash))
                        .filter(oc::consumed_at.is_null()),
                )
                .set(oc::consumed_at.eq(&now_str))
                .execute(conn)?;
                if updated != 1 {
                    return Ok(CodeRedemption::AlreadyUsed);
                }
                diesel::insert_into(oauth_access_tokens::table)
                    .values(&token)
                    .execute(conn)?;
                Ok(CodeRedemption::Redeemed(row))
            })
        })
        .await?
    }

    async fn delete_expired_codes(&self) -> anyhow::Result<usize> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
            let mut conn = pool.get()?;
            let now = OffsetDateTime::now_utc();
            use oauth_codes::dsl as oc;
            // Timestamps are RFC 3339 strings; compare parsed, not lexically.
            let rows: Vec<(String, String)> = oc::oauth_codes
                .select((oc::code_hash, oc::expires_at))
                .load(&mut conn)?;
            let dead: Vec<String> = rows
                .into_iter()
                .filter(|(_, exp)| security::is_past(exp, now))
                .map(|(hash, _)| hash)
                .collect();
            if dead.is_empty() {
                return Ok(0);
            }
            let n = diesel::delete(oc::oauth_codes.filter(oc::code_hash.eq_any(&dead)))
                .execute(&mut conn)?;
            Ok(n)
        })
        .await?
    }

    async fn find_token_by_hash(
        &self,
        token_hash: &str,
    ) -> anyhow::Result<Option<OAuthAccessToken>> {
        let token_hash = token_hash.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<OAuthAccessToken>> {
            let mut conn = pool.get()?;
            let row = oauth_access_tokens::table
                .filter(oauth_access_tokens::token_hash.eq(&token_hash))
                .first::<OAuthAccessToken>(&mut conn)
                .optional()?;
            Ok(row)
        })
        .await?
    }

    async fn find_token_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
        client_id: &str,
    ) -> anyhow::Result<Option<OAuthAccessToken>> {
        let refresh_token_hash = refresh_token_hash.to_string();
        let client_id = client_id.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<OAuthAccessToken>> {
            let mut conn = pool.get()?;
            let row = oauth_access_tokens::table
                .filter(oauth_access_tokens::refresh_token_hash.eq(&refresh_token_hash))
                .filter(oauth_access_tokens::client_id.eq(&client_id))
                .filter(oauth_access_tokens::revoked_at.is_null())
                .first::<OAuthAccessToken>(&mut conn)
                .optional()?;
            Ok(row)
        })
        .await?
    }

    async fn rotate_token(
        &self,
        old_token_id: &str,
        new_token: OAuthAccessToken,
    ) -> anyhow::Result<bool> {
        let old_token_id = old_token_id.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
            let mut conn = pool.get()?;
            let now = security::format_rfc3339(OffsetDateTime::now_utc());
            conn.immediate_transaction(|conn| {
                use oauth_access_tokens::dsl as at;
                let revoked = diesel::update(
                    at::oauth_access_tokens
                        .filter(at::id.eq(&old_token_id))
                        .filter(at::revoked_at.is_null()),
                )
                .set(at::revoked_at.eq(&now))
                .execute(conn)?;
                if revoked != 1 {
                    // Lost a race with another rotation or an explicit
                    // revocation; issue nothing.
                    return Ok(false);
                }
                diesel::insert_into(at::oauth_access_tokens)
                    .values(&new_token)
                    .execute(conn)?;
                Ok(true)
            })
        })
        .await?
    }

    async fn revoke_token(&self, token_id: &str) -> anyhow::Result<usize> {
        let token_id = token_id.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
            let mut conn = pool.get()?;
            let now = security::format_rfc3339(OffsetDateTime::now_utc());
            use oauth_access_tokens::dsl as at;
            let n = diesel::update(
                at::oauth_access_tokens
                    .filter(at::id.eq(&token_id))
                    .filter(at::revoked_at.is_null()),
            )
            .set(at::revoked_at.eq(&now))
            .execute(&mut conn)?;
            Ok(n)
        })
        .await?
    }

    async fn revoke_all_for_client(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> anyhow::Result<usize> {
        let user_id = user_id.to_string();
        let client_id = client_id.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
            let mut conn = pool.get()?;
            let now = security::format_rfc3339(OffsetDateTime::now_utc());
            use oauth_access_tokens::dsl as at;
            let n = diesel::update(
                at::oauth_access_tokens
                    .filter(at::user_id.eq(&user_id))
                    .filter(at::client_id.eq(&client_id))
                    .filter(at::revoked_at.is_null()),
            )
            .set(at::revoked_at.eq(&now))
            .execute(&mut conn)?;
            Ok(n)
        })
        .await?
    }

    async fn find_active_token_for_client(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> anyhow::Result<Option<OAuthAccessToken>> {
        let user_id = user_id.to_string();
        let client_id = client_id.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<OAuthAccessToken>> {
            let mut conn = pool.get()?;
            let row = oauth_access_tokens::table
                .filter(oauth_access_tokens::user_id.eq(&user_id))
                .filter(oauth_access_tokens::client_id.eq(&client_id))
                .filter(oauth_access_tokens::revoked_at.is_null())
                .order(oauth_access_tokens::created_at.desc())
                .first::<OAuthAccessToken>(&mut conn)
                .optional()?;
            Ok(row)
        })
        .await?
    }

    async fn list_active_tokens_for_user(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Vec<OAuthAccessToken>> {
        let user_id = user_id.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<OAuthAccessToken>> {
            let mut conn = pool.get()?;
            let rows = oauth_access_tokens::table
                .filter(oauth_access_tokens::user_id.eq(&user_id))
                .filter(oauth_access_tokens::revoked_at.is_null())
                .order(oauth_access_tokens::created_at.desc())
                .load::<OAuthAccessToken>(&mut conn)?;
            Ok(rows)
        })
        .await?
    }

    async fn touch_token_last_used(&self, token_id: &str) -> anyhow::Result<()> {
        let token_id = token_id.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut conn = pool.get()?;
            let now = security::format_rfc3339(OffsetDateTime::now_utc());
            diesel::update(oauth_access_tokens::table.find(&token_id))
                .set(oauth_access_tokens::last_used_at.eq(&now))
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    async fn delete_tokens_expired_for(&self, retention_days: i64) -> anyhow::Result<usize> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
            let mut conn = pool.get()?;
            let cutoff = OffsetDateTime::now_utc() - Duration::days(retention_days);
            use oauth_access_tokens::dsl as at;
            let rows: Vec<(String, String)> = at::oauth_access_tokens
                .select((at::id, at::expires_at))
                .load(&mut conn)?;
            let dead: Vec<String> = rows
                .into_iter()
                .filter(|(_, exp)| security::is_past(exp, cutoff))
                .map(|(id, _)| id)
                .collect();
            if dead.is_empty() {
                return Ok(0);
            }
            let n = diesel::delete(at::oauth_access_tokens.filter(at::id.eq_any(&dead)))
                .execute(&mut conn)?;
            Ok(n)
        })
        .await?
    }
}
