//! SQLite-backed store.

use super::{CredentialStore, DirectoryStore};
use crate::credentials::{ServiceCredential, ServiceId, SessionId, UserCredential};
use crate::directory::{Account, AccountId, Team, TeamId};
use crate::permissions::PermissionSet;
use crate::token::Secret;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use podium_core::{PodiumError, PodiumResult};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite implementation of both store traits.
///
/// Timestamps are stored as RFC 3339 text, permission bitfields as
/// integers. Secret columns are UNIQUE. Statement-level atomicity
/// gives rotation and deletion the no-torn-state property the contract
/// requires.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to the database and create the schema if needed.
    ///
    /// Foreign keys are enabled on every pooled connection; the cascade
    /// from accounts to sessions depends on it.
    pub async fn connect(url: &str) -> PodiumResult<Self> {
        let options = sqlx::sqlite::SqliteConnectOptions::from_str(url)
            .map_err(PodiumError::storage)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(PodiumError::storage)?;
        let store = Self { pool };
        store.create_tables().await?;
        info!(url, "connected to database");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_tables(&self) -> PodiumResult<()> {
        let schema = r#"
            CREATE TABLE IF NOT EXISTS teams (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                discriminator TEXT NOT NULL,
                avatar_url TEXT,
                team_id INTEGER REFERENCES teams(id) ON DELETE SET NULL,
                permissions INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS services (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                label TEXT NOT NULL,
                secret TEXT NOT NULL UNIQUE,
                permissions INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL
                    REFERENCES accounts(id) ON DELETE CASCADE,
                secret TEXT NOT NULL UNIQUE,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_team ON accounts(team_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_account ON sessions(account_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON sessions(expires_at);
        "#;

        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        Ok(())
    }

    fn parse_timestamp(raw: &str) -> PodiumResult<DateTime<Utc>> {
        raw.parse()
            .map_err(|_| PodiumError::storage(format!("unparseable timestamp: {}", raw)))
    }

    fn service_from_row(row: &sqlx::sqlite::SqliteRow) -> PodiumResult<ServiceCredential> {
        Ok(ServiceCredential {
            id: row.get("id"),
            label: row.get("label"),
            secret: Secret::from(row.get::<String, _>("secret")),
            permissions: PermissionSet::from_bits(row.get::<i64, _>("permissions") as u32)?,
            created_at: Self::parse_timestamp(&row.get::<String, _>("created_at"))?,
        })
    }

    fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> PodiumResult<UserCredential> {
        Ok(UserCredential {
            id: row.get("id"),
            account_id: row.get("account_id"),
            secret: Secret::from(row.get::<String, _>("secret")),
            expires_at: Self::parse_timestamp(&row.get::<String, _>("expires_at"))?,
            created_at: Self::parse_timestamp(&row.get::<String, _>("created_at"))?,
        })
    }

    fn account_from_row(row: &sqlx::sqlite::SqliteRow) -> PodiumResult<Account> {
        Ok(Account {
            id: row.get("id"),
            name: row.get("name"),
            discriminator: row.get("discriminator"),
            avatar_url: row.get("avatar_url"),
            team: row.get("team_id"),
            permissions: PermissionSet::from_bits(row.get::<i64, _>("permissions") as u32)?,
            created_at: Self::parse_timestamp(&row.get::<String, _>("created_at"))?,
        })
    }

    fn team_from_row(row: &sqlx::sqlite::SqliteRow) -> PodiumResult<Team> {
        Ok(Team {
            id: row.get("id"),
            name: row.get("name"),
            created_at: Self::parse_timestamp(&row.get::<String, _>("created_at"))?,
        })
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn find_service(
        &self,
        id: ServiceId,
        secret: &Secret,
    ) -> PodiumResult<Option<ServiceCredential>> {
        // Fetch by id, compare in constant time; the database never
        // sees the presented secret.
        let row = sqlx::query("SELECT * FROM services WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        match row {
            Some(row) => {
                let credential = Self::service_from_row(&row)?;
                Ok((credential.secret == *secret).then_some(credential))
            }
            None => Ok(None),
        }
    }

    async fn find_session(
        &self,
        id: SessionId,
        secret: &Secret,
    ) -> PodiumResult<Option<UserCredential>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        match row {
            Some(row) => {
                let session = Self::session_from_row(&row)?;
                Ok((session.secret == *secret).then_some(session))
            }
            None => Ok(None),
        }
    }

    async fn get_service(&self, id: ServiceId) -> PodiumResult<Option<ServiceCredential>> {
        let row = sqlx::query("SELECT * FROM services WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        row.map(|row| Self::service_from_row(&row)).transpose()
    }

    async fn list_services(&self) -> PodiumResult<Vec<ServiceCredential>> {
        let rows = sqlx::query("SELECT * FROM services ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        rows.iter().map(Self::service_from_row).collect()
    }

    async fn create_service(
        &self,
        label: &str,
        permissions: PermissionSet,
    ) -> PodiumResult<ServiceCredential> {
        let secret = Secret::generate();
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO services (label, secret, permissions, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(label)
        .bind(secret.expose())
        .bind(permissions.bits() as i64)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(PodiumError::storage)?;

        let id = result.last_insert_rowid();
        debug!(service = id, label, "created service credential");
        Ok(ServiceCredential {
            id,
            label: label.to_string(),
            secret,
            permissions,
            created_at,
        })
    }

    async fn update_service(
        &self,
        id: ServiceId,
        label: Option<&str>,
        permissions: Option<PermissionSet>,
    ) -> PodiumResult<()> {
        let result = sqlx::query(
            "UPDATE services SET label = COALESCE(?, label), \
             permissions = COALESCE(?, permissions) WHERE id = ?",
        )
        .bind(label)
        .bind(permissions.map(|p| p.bits() as i64))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(PodiumError::storage)?;
        if result.rows_affected() == 0 {
            return Err(PodiumError::not_found(format!("service credential {}", id)));
        }
        Ok(())
    }

    async fn delete_service(&self, id: ServiceId) -> PodiumResult<()> {
        sqlx::query("DELETE FROM services WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        Ok(())
    }

    async fn create_session(
        &self,
        account_id: AccountId,
        expires_at: DateTime<Utc>,
    ) -> PodiumResult<UserCredential> {
        let secret = Secret::generate();
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO sessions (account_id, secret, expires_at, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(account_id)
        .bind(secret.expose())
        .bind(expires_at.to_rfc3339())
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                PodiumError::not_found(format!("account {}", account_id))
            }
            other => PodiumError::storage(other),
        })?;

        let id = result.last_insert_rowid();
        debug!(session = id, account = account_id, "created session");
        Ok(UserCredential {
            id,
            account_id,
            secret,
            expires_at,
            created_at,
        })
    }

    async fn delete_session(&self, id: SessionId) -> PodiumResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        Ok(())
    }

    async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> PodiumResult<usize> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        Ok(result.rows_affected() as usize)
    }

    async fn rotate_service_secret(&self, id: ServiceId) -> PodiumResult<Secret> {
        let secret = Secret::generate();
        let result = sqlx::query("UPDATE services SET secret = ? WHERE id = ?")
            .bind(secret.expose())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        if result.rows_affected() == 0 {
            return Err(PodiumError::not_found(format!("service credential {}", id)));
        }
        Ok(secret)
    }

    async fn rotate_session_secret(
        &self,
        id: SessionId,
        expires_at: DateTime<Utc>,
    ) -> PodiumResult<Secret> {
        let secret = Secret::generate();
        let result = sqlx::query("UPDATE sessions SET secret = ?, expires_at = ? WHERE id = ?")
            .bind(secret.expose())
            .bind(expires_at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        if result.rows_affected() == 0 {
            return Err(PodiumError::not_found(format!("session {}", id)));
        }
        Ok(secret)
    }
}

#[async_trait]
impl DirectoryStore for SqliteStore {
    async fn get_account(&self, id: AccountId) -> PodiumResult<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        row.map(|row| Self::account_from_row(&row)).transpose()
    }

    async fn create_account(&self, account: &Account) -> PodiumResult<()> {
        sqlx::query(
            "INSERT INTO accounts (id, name, discriminator, avatar_url, team_id, \
             permissions, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(&account.discriminator)
        .bind(&account.avatar_url)
        .bind(account.team)
        .bind(account.permissions.bits() as i64)
        .bind(account.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                PodiumError::conflict(format!("account {} already registered", account.id))
            }
            other => PodiumError::storage(other),
        })?;
        Ok(())
    }

    async fn update_account(&self, account: &Account) -> PodiumResult<()> {
        let result = sqlx::query(
            "UPDATE accounts SET name = ?, discriminator = ?, avatar_url = ?, team_id = ? \
             WHERE id = ?",
        )
        .bind(&account.name)
        .bind(&account.discriminator)
        .bind(&account.avatar_url)
        .bind(account.team)
        .bind(account.id)
        .execute(&self.pool)
        .await
        .map_err(PodiumError::storage)?;
        if result.rows_affected() == 0 {
            return Err(PodiumError::not_found(format!("account {}", account.id)));
        }
        Ok(())
    }

    async fn set_account_permissions(
        &self,
        id: AccountId,
        permissions: PermissionSet,
    ) -> PodiumResult<()> {
        let result = sqlx::query("UPDATE accounts SET permissions = ? WHERE id = ?")
            .bind(permissions.bits() as i64)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        if result.rows_affected() == 0 {
            return Err(PodiumError::not_found(format!("account {}", id)));
        }
        Ok(())
    }

    async fn delete_account(&self, id: AccountId) -> PodiumResult<()> {
        // Sessions go with the account via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        if result.rows_affected() == 0 {
            return Err(PodiumError::not_found(format!("account {}", id)));
        }
        Ok(())
    }

    async fn get_team(&self, id: TeamId) -> PodiumResult<Option<Team>> {
        let row = sqlx::query("SELECT * FROM teams WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        row.map(|row| Self::team_from_row(&row)).transpose()
    }

    async fn create_team(&self, name: &str) -> PodiumResult<Team> {
        let created_at = Utc::now();
        let result = sqlx::query("INSERT INTO teams (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        Ok(Team {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            created_at,
        })
    }

    async fn rename_team(&self, id: TeamId, name: &str) -> PodiumResult<()> {
        let result = sqlx::query("UPDATE teams SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        if result.rows_affected() == 0 {
            return Err(PodiumError::not_found(format!("team {}", id)));
        }
        Ok(())
    }

    async fn delete_team(&self, id: TeamId) -> PodiumResult<()> {
        // Membership is cleared by ON DELETE SET NULL.
        let result = sqlx::query("DELETE FROM teams WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        if result.rows_affected() == 0 {
            return Err(PodiumError::not_found(format!("team {}", id)));
        }
        Ok(())
    }

    async fn count_team_members(&self, id: TeamId) -> PodiumResult<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM accounts WHERE team_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(PodiumError::storage)?;
        let count: i64 = row.get("count");
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Permission;
    use chrono::Duration;

    // A file-backed database: pooled connections to ":memory:" would
    // each see their own empty database.
    async fn test_db() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("podium.db").display());
        let store = SqliteStore::connect(&url).await.unwrap();
        (dir, store)
    }

    fn account(id: AccountId, team: Option<TeamId>) -> Account {
        Account {
            id,
            name: "member".to_string(),
            discriminator: "0001".to_string(),
            avatar_url: None,
            team,
            permissions: PermissionSet::EMPTY,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn permission_bits_round_trip_through_the_schema() {
        let (_dir, store) = test_db().await;
        let permissions = PermissionSet::of(&[
            Permission::ManagePermissions,
            Permission::ManageTeams,
            Permission::AuthenticateUsers,
        ]);
        let created = store.create_service("registrar", permissions).await.unwrap();

        let fetched = store
            .find_service(created.id, &created.secret)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.permissions, permissions);
        assert_eq!(fetched.label, "registrar");
    }

    #[tokio::test]
    async fn wrong_secret_is_indistinguishable_from_missing_id() {
        let (_dir, store) = test_db().await;
        let created = store
            .create_service("judge", PermissionSet::EMPTY)
            .await
            .unwrap();

        let wrong = Secret::from("nope");
        assert!(store.find_service(created.id, &wrong).await.unwrap().is_none());
        assert!(store.find_service(999, &wrong).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_cascade_and_team_nulling() {
        let (_dir, store) = test_db().await;
        let team = store.create_team("blues").await.unwrap();
        store.create_account(&account(42, Some(team.id))).await.unwrap();
        let session = store
            .create_session(42, Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        store.delete_team(team.id).await.unwrap();
        assert_eq!(store.get_account(42).await.unwrap().unwrap().team, None);

        store.delete_account(42).await.unwrap();
        assert!(store
            .find_session(session.id, &session.secret)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rotation_is_effective_immediately() {
        let (_dir, store) = test_db().await;
        let created = store
            .create_service("judge", PermissionSet::EMPTY)
            .await
            .unwrap();

        let rotated = store.rotate_service_secret(created.id).await.unwrap();
        assert!(store
            .find_service(created.id, &created.secret)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_service(created.id, &rotated)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn creating_a_session_for_a_missing_account_is_not_found() {
        let (_dir, store) = test_db().await;
        let err = store
            .create_session(7, Utc::now() + Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PodiumError::NotFound { .. }));
    }
}
