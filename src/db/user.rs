use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// Account lifecycle status.
///
/// Accounts start `pending` and become `active` only through a successful
/// email-verification confirmation. `inactive` disables the account without
/// deleting it; the request authenticator refuses such identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "active" => UserStatus::Active,
            "inactive" => UserStatus::Inactive,
            _ => UserStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub full_name: String,
    pub status: UserStatus,
    /// Opaque role tags, consumed (not designed) by this service
    pub roles: Vec<String>,
    /// Credential epoch, bumped on password reset to invalidate outstanding
    /// session tokens
    pub token_epoch: i64,
}

/// Parameters for creating a pending user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub full_name: String,
    pub roles: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    username: String,
    email: String,
    phone: Option<String>,
    password_hash: String,
    full_name: String,
    status: String,
    roles: String,
    token_epoch: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            username: row.username,
            email: row.email,
            phone: row.phone,
            password_hash: row.password_hash,
            full_name: row.full_name,
            status: UserStatus::from_str(&row.status),
            roles: split_roles(&row.roles),
            token_epoch: row.token_epoch,
        }
    }
}

fn split_roles(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_roles(roles: &[String]) -> String {
    roles.join(",")
}

const SELECT_COLUMNS: &str = "id, uuid, username, email, phone, password_hash, full_name, status, roles, token_epoch";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new pending user. Returns the user ID.
    pub async fn create(&self, user: &NewUser) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, username, email, phone, password_hash, full_name, status, roles)
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)",
        )
        .bind(&user.uuid)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(join_roles(&user.roles))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Flip a user to active. Idempotent: activating an already-active user
    /// affects no rows and is not an error.
    pub async fn activate(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET status = 'active' WHERE id = ? AND status != 'active'")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the password hash and bump the credential epoch so every
    /// previously issued session token stops validating.
    pub async fn update_password(&self, id: i64, password_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, token_epoch = token_epoch + 1 WHERE id = ?",
        )
        .bind(password_hash)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get a user by username.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ?",
            SELECT_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by email.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE email = ?",
            SELECT_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by phone number.
    pub async fn get_by_phone(&self, phone: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE phone = ?",
            SELECT_COLUMNS
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE uuid = ?",
            SELECT_COLUMNS
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_round_trip() {
        let roles = vec!["user".to_string(), "moderator".to_string()];
        assert_eq!(split_roles(&join_roles(&roles)), roles);
    }

    #[test]
    fn test_split_roles_tolerates_spacing() {
        assert_eq!(
            split_roles("user, admin ,"),
            vec!["user".to_string(), "admin".to_string()]
        );
        assert!(split_roles("").is_empty());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [UserStatus::Pending, UserStatus::Active, UserStatus::Inactive] {
            assert_eq!(UserStatus::from_str(status.as_str()), status);
        }
    }
}
