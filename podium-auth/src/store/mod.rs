//! Storage contracts for credentials and the member directory.
//!
//! The core is stateless between requests; every authenticate call
//! re-reads the credential here. Each operation must be atomic with
//! respect to concurrent requests on the same credential: a reader
//! racing a rotation sees the old secret or the new one, never a torn
//! state. Concurrent permission edits on one account are a
//! last-write-wins race by contract.

use crate::credentials::{ServiceCredential, ServiceId, SessionId, UserCredential};
use crate::directory::{Account, AccountId, Team, TeamId};
use crate::permissions::PermissionSet;
use crate::token::Secret;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use podium_core::PodiumResult;

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Storage for both credential kinds.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a service credential by id and secret.
    ///
    /// A secret mismatch must be indistinguishable from an unknown id,
    /// and the comparison constant-time: fetch by id, then compare.
    async fn find_service(
        &self,
        id: ServiceId,
        secret: &Secret,
    ) -> PodiumResult<Option<ServiceCredential>>;

    /// Look up a session by id and secret. Same mismatch rules as
    /// [`find_service`]; expiry is the caller's concern.
    ///
    /// [`find_service`]: CredentialStore::find_service
    async fn find_session(
        &self,
        id: SessionId,
        secret: &Secret,
    ) -> PodiumResult<Option<UserCredential>>;

    async fn get_service(&self, id: ServiceId) -> PodiumResult<Option<ServiceCredential>>;

    async fn list_services(&self) -> PodiumResult<Vec<ServiceCredential>>;

    /// Mint a service credential with a fresh secret.
    async fn create_service(
        &self,
        label: &str,
        permissions: PermissionSet,
    ) -> PodiumResult<ServiceCredential>;

    /// Replace a service credential's label and/or permissions.
    async fn update_service(
        &self,
        id: ServiceId,
        label: Option<&str>,
        permissions: Option<PermissionSet>,
    ) -> PodiumResult<()>;

    async fn delete_service(&self, id: ServiceId) -> PodiumResult<()>;

    /// Mint a session bound to an account.
    async fn create_session(
        &self,
        account_id: AccountId,
        expires_at: DateTime<Utc>,
    ) -> PodiumResult<UserCredential>;

    /// Delete a session. Deleting a session that is already gone is a
    /// no-op: lazy reaping and logout may race.
    async fn delete_session(&self, id: SessionId) -> PodiumResult<()>;

    /// Delete every session whose expiry has passed; returns how many.
    async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> PodiumResult<usize>;

    /// Atomically replace a service credential's secret. The old secret
    /// stops authenticating the moment this returns.
    async fn rotate_service_secret(&self, id: ServiceId) -> PodiumResult<Secret>;

    /// Atomically replace a session's secret and reset its expiry.
    async fn rotate_session_secret(
        &self,
        id: SessionId,
        expires_at: DateTime<Utc>,
    ) -> PodiumResult<Secret>;
}

/// Storage for accounts and teams.
///
/// Lookups return `None` for a missing entity so callers can produce
/// not-found, which must stay distinct from permission denial.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn get_account(&self, id: AccountId) -> PodiumResult<Option<Account>>;

    /// Insert an account with its externally-assigned id. An existing
    /// id is a conflict.
    async fn create_account(&self, account: &Account) -> PodiumResult<()>;

    /// Replace an account's details and team reference. Permissions are
    /// not touched by this call.
    async fn update_account(&self, account: &Account) -> PodiumResult<()>;

    /// Atomically replace an account's permission bitfield.
    async fn set_account_permissions(
        &self,
        id: AccountId,
        permissions: PermissionSet,
    ) -> PodiumResult<()>;

    /// Delete an account and, with it, every session it owns.
    async fn delete_account(&self, id: AccountId) -> PodiumResult<()>;

    async fn get_team(&self, id: TeamId) -> PodiumResult<Option<Team>>;

    async fn create_team(&self, name: &str) -> PodiumResult<Team>;

    async fn rename_team(&self, id: TeamId, name: &str) -> PodiumResult<()>;

    /// Delete a team. Member accounts lose their team reference; they
    /// are not deleted.
    async fn delete_team(&self, id: TeamId) -> PodiumResult<()>;

    async fn count_team_members(&self, id: TeamId) -> PodiumResult<usize>;
}
