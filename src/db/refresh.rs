//! Durable refresh token storage.
//!
//! Refresh tokens are opaque random strings, not JWTs. Expired records are
//! purged eagerly when touched; the cleanup scheduler sweeps whatever is
//! never touched again.

use base64::Engine;
use sqlx::sqlite::SqlitePool;
use std::time::{SystemTime, UNIX_EPOCH};

/// Refresh token duration: 2 weeks
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 14 * 24 * 60 * 60;

/// A durable refresh token record.
#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub token: String,
    pub user_id: i64,
    /// Absolute expiry (Unix timestamp)
    pub expires_at: i64,
}

impl RefreshRecord {
    /// Whether the record has passed its absolute expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_now()
    }
}

/// Store for managing refresh tokens.
#[derive(Clone)]
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Mint and persist a fresh opaque token for a user.
    pub async fn create(&self, user_id: i64) -> Result<RefreshRecord, sqlx::Error> {
        let token = generate_opaque_token();
        let expires_at = unix_now() + REFRESH_TOKEN_DURATION_SECS as i64;

        sqlx::query("INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;

        Ok(RefreshRecord {
            token,
            user_id,
            expires_at,
        })
    }

    /// Look up a record by its token, expired or not. Liveness is the
    /// caller's check so it can purge on touch.
    pub async fn find_by_token(&self, token: &str) -> Result<Option<RefreshRecord>, sqlx::Error> {
        let row: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT token, user_id, expires_at FROM refresh_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(token, user_id, expires_at)| RefreshRecord {
            token,
            user_id,
            expires_at,
        }))
    }

    /// Delete a record by token (logout, rotation). Returns whether a row
    /// existed; deleting an absent token is not an error.
    pub async fn delete_by_token(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every record belonging to a user (forced re-login everywhere).
    pub async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete all expired records.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= strftime('%s', 'now')")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

/// 32 random bytes, base64url without padding.
fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
