//! Verification record storage with TTL expiry.
//!
//! Records are keyed by the verification token string and carry an absolute
//! `expires_at` written at creation. Every read treats rows past their
//! expiry as absent, so TTL lapse pre-empts the status state machine; the
//! cleanup scheduler physically removes lapsed rows.

use sqlx::sqlite::SqlitePool;

/// What a verification record confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationKind {
    /// Explicitly requested email confirmation (resend endpoint)
    Email,
    /// Signup-triggered email confirmation
    Register,
    /// Password reset
    ForgotPassword,
}

impl VerificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationKind::Email => "email",
            VerificationKind::Register => "register",
            VerificationKind::ForgotPassword => "forgot_password",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "register" => VerificationKind::Register,
            "forgot_password" => VerificationKind::ForgotPassword,
            _ => VerificationKind::Email,
        }
    }
}

/// Record lifecycle status.
///
/// Email/register records go `waiting -> done`; forgot-password records pass
/// through `in_progress` between link confirmation and the actual password
/// change. `done` records are deleted immediately, the variant exists so a
/// transition target is always nameable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Waiting,
    InProgress,
    Done,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Waiting => "waiting",
            VerificationStatus::InProgress => "in_progress",
            VerificationStatus::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "in_progress" => VerificationStatus::InProgress,
            "done" => VerificationStatus::Done,
            _ => VerificationStatus::Waiting,
        }
    }
}

/// A pending out-of-band confirmation, keyed by its token.
#[derive(Debug, Clone)]
pub struct VerificationRecord {
    pub token: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub kind: VerificationKind,
    pub status: VerificationStatus,
}

/// Store for verification records.
#[derive(Clone)]
pub struct VerificationStore {
    pool: SqlitePool,
}

type RecordRow = (String, String, Option<String>, String, String);

fn row_to_record((token, email, phone_number, kind, status): RecordRow) -> VerificationRecord {
    VerificationRecord {
        token,
        email,
        phone_number,
        kind: VerificationKind::from_str(&kind),
        status: VerificationStatus::from_str(&status),
    }
}

impl VerificationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write a record with an absolute TTL of `ttl_minutes` from now.
    /// Callers check liveness first; an existing live record for the same
    /// `(email, kind)` means creation should not be attempted.
    pub async fn save(
        &self,
        record: &VerificationRecord,
        ttl_minutes: u64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO verification_records
             (token, email, phone_number, kind, status, expires_at)
             VALUES (?, ?, ?, ?, ?, datetime('now', '+' || ? || ' minutes'))",
        )
        .bind(&record.token)
        .bind(&record.email)
        .bind(&record.phone_number)
        .bind(record.kind.as_str())
        .bind(record.status.as_str())
        .bind(ttl_minutes as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a record by token. Rows past their TTL read as `None`.
    pub async fn get(&self, token: &str) -> Result<Option<VerificationRecord>, sqlx::Error> {
        let row: Option<RecordRow> = sqlx::query_as(
            "SELECT token, email, phone_number, kind, status FROM verification_records
             WHERE token = ? AND expires_at > datetime('now')",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_record))
    }

    /// Get the live (non-expired, non-done) record for an `(email, kind)`
    /// pair, if any. Served by the secondary index, not a key scan.
    pub async fn get_live_by_email(
        &self,
        email: &str,
        kind: VerificationKind,
    ) -> Result<Option<VerificationRecord>, sqlx::Error> {
        let row: Option<RecordRow> = sqlx::query_as(
            "SELECT token, email, phone_number, kind, status FROM verification_records
             WHERE email = ? AND kind = ? AND status != 'done' AND expires_at > datetime('now')
             LIMIT 1",
        )
        .bind(email)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_record))
    }

    /// In-place status mutation. Preserves the TTL and refuses rows that
    /// have already lapsed.
    pub async fn update_status(
        &self,
        token: &str,
        status: VerificationStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE verification_records SET status = ?
             WHERE token = ? AND expires_at > datetime('now')",
        )
        .bind(status.as_str())
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a record (successful confirmation).
    pub async fn delete(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM verification_records WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Physically remove lapsed rows. Reads already ignore them; this keeps
    /// the table from growing unbounded.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM verification_records WHERE expires_at <= datetime('now')")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn record(token: &str, email: &str, kind: VerificationKind) -> VerificationRecord {
        VerificationRecord {
            token: token.to_string(),
            email: email.to_string(),
            phone_number: None,
            kind,
            status: VerificationStatus::Waiting,
        }
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.verifications();

        store
            .save(&record("tok-1", "alice@x.com", VerificationKind::Email), 15)
            .await
            .unwrap();

        let found = store.get("tok-1").await.unwrap().unwrap();
        assert_eq!(found.email, "alice@x.com");
        assert_eq!(found.kind, VerificationKind::Email);
        assert_eq!(found.status, VerificationStatus::Waiting);

        assert!(store.get("tok-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_record_reads_as_absent() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.verifications();

        // Insert a lapsed row directly
        sqlx::query(
            "INSERT INTO verification_records (token, email, kind, status, expires_at)
             VALUES ('tok-old', 'old@x.com', 'email', 'waiting', datetime('now', '-1 minutes'))",
        )
        .execute(db.pool())
        .await
        .unwrap();

        assert!(store.get("tok-old").await.unwrap().is_none());
        assert!(
            store
                .get_live_by_email("old@x.com", VerificationKind::Email)
                .await
                .unwrap()
                .is_none()
        );

        // The state machine is pre-empted too: no transition on lapsed rows
        assert!(
            !store
                .update_status("tok-old", VerificationStatus::InProgress)
                .await
                .unwrap()
        );

        let removed = store.delete_expired().await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_live_lookup_by_email_and_kind() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.verifications();

        store
            .save(
                &record("tok-fp", "alice@x.com", VerificationKind::ForgotPassword),
                15,
            )
            .await
            .unwrap();

        // Same email, different kind: no match
        assert!(
            store
                .get_live_by_email("alice@x.com", VerificationKind::Email)
                .await
                .unwrap()
                .is_none()
        );

        let found = store
            .get_live_by_email("alice@x.com", VerificationKind::ForgotPassword)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.token, "tok-fp");
    }

    #[tokio::test]
    async fn test_update_status_in_place() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.verifications();

        store
            .save(
                &record("tok-fp", "alice@x.com", VerificationKind::ForgotPassword),
                15,
            )
            .await
            .unwrap();

        assert!(
            store
                .update_status("tok-fp", VerificationStatus::InProgress)
                .await
                .unwrap()
        );

        let found = store.get("tok-fp").await.unwrap().unwrap();
        assert_eq!(found.status, VerificationStatus::InProgress);
    }

    #[tokio::test]
    async fn test_delete() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.verifications();

        store
            .save(&record("tok-1", "alice@x.com", VerificationKind::Email), 15)
            .await
            .unwrap();

        assert!(store.delete("tok-1").await.unwrap());
        assert!(!store.delete("tok-1").await.unwrap());
        assert!(store.get("tok-1").await.unwrap().is_none());
    }
}
