//! In-memory store for tests and single-process deployments.

use super::{CredentialStore, DirectoryStore};
use crate::credentials::{ServiceCredential, ServiceId, SessionId, UserCredential};
use crate::directory::{Account, AccountId, Team, TeamId};
use crate::permissions::PermissionSet;
use crate::token::Secret;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use podium_core::{PodiumError, PodiumResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Tables {
    services: HashMap<ServiceId, ServiceCredential>,
    sessions: HashMap<SessionId, UserCredential>,
    accounts: HashMap<AccountId, Account>,
    teams: HashMap<TeamId, Team>,
    /// Mirrors the database UNIQUE constraint on secrets.
    live_secrets: HashSet<String>,
}

/// An in-memory implementation of both store traits.
///
/// A single `RwLock` over all tables gives every operation the
/// atomicity the contract asks for.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_service_id: AtomicI64,
    next_session_id: AtomicI64,
    next_team_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_service_id: AtomicI64::new(1),
            next_session_id: AtomicI64::new(1),
            next_team_id: AtomicI64::new(1),
        }
    }

    fn claim_secret(tables: &mut Tables, secret: &Secret) -> PodiumResult<()> {
        if !tables.live_secrets.insert(secret.expose().to_string()) {
            return Err(PodiumError::conflict("secret collision"));
        }
        Ok(())
    }

    fn release_secret(tables: &mut Tables, secret: &Secret) {
        tables.live_secrets.remove(secret.expose());
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_service(
        &self,
        id: ServiceId,
        secret: &Secret,
    ) -> PodiumResult<Option<ServiceCredential>> {
        let tables = self.tables.read().await;
        Ok(tables
            .services
            .get(&id)
            .filter(|credential| credential.secret == *secret)
            .cloned())
    }

    async fn find_session(
        &self,
        id: SessionId,
        secret: &Secret,
    ) -> PodiumResult<Option<UserCredential>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .get(&id)
            .filter(|session| session.secret == *secret)
            .cloned())
    }

    async fn get_service(&self, id: ServiceId) -> PodiumResult<Option<ServiceCredential>> {
        Ok(self.tables.read().await.services.get(&id).cloned())
    }

    async fn list_services(&self) -> PodiumResult<Vec<ServiceCredential>> {
        let mut services: Vec<_> = self.tables.read().await.services.values().cloned().collect();
        services.sort_by_key(|credential| credential.id);
        Ok(services)
    }

    async fn create_service(
        &self,
        label: &str,
        permissions: PermissionSet,
    ) -> PodiumResult<ServiceCredential> {
        let credential = ServiceCredential {
            id: self.next_service_id.fetch_add(1, Ordering::SeqCst),
            label: label.to_string(),
            secret: Secret::generate(),
            permissions,
            created_at: Utc::now(),
        };
        let mut tables = self.tables.write().await;
        Self::claim_secret(&mut tables, &credential.secret)?;
        tables.services.insert(credential.id, credential.clone());
        debug!(service = credential.id, label, "created service credential");
        Ok(credential)
    }

    async fn update_service(
        &self,
        id: ServiceId,
        label: Option<&str>,
        permissions: Option<PermissionSet>,
    ) -> PodiumResult<()> {
        let mut tables = self.tables.write().await;
        let credential = tables
            .services
            .get_mut(&id)
            .ok_or_else(|| PodiumError::not_found(format!("service credential {}", id)))?;
        if let Some(label) = label {
            credential.label = label.to_string();
        }
        if let Some(permissions) = permissions {
            credential.permissions = permissions;
        }
        Ok(())
    }

    async fn delete_service(&self, id: ServiceId) -> PodiumResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(credential) = tables.services.remove(&id) {
            Self::release_secret(&mut tables, &credential.secret);
        }
        Ok(())
    }

    async fn create_session(
        &self,
        account_id: AccountId,
        expires_at: DateTime<Utc>,
    ) -> PodiumResult<UserCredential> {
        let mut tables = self.tables.write().await;
        if !tables.accounts.contains_key(&account_id) {
            return Err(PodiumError::not_found(format!("account {}", account_id)));
        }
        let session = UserCredential {
            id: self.next_session_id.fetch_add(1, Ordering::SeqCst),
            account_id,
            secret: Secret::generate(),
            expires_at,
            created_at: Utc::now(),
        };
        Self::claim_secret(&mut tables, &session.secret)?;
        tables.sessions.insert(session.id, session.clone());
        debug!(session = session.id, account = account_id, "created session");
        Ok(session)
    }

    async fn delete_session(&self, id: SessionId) -> PodiumResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(session) = tables.sessions.remove(&id) {
            Self::release_secret(&mut tables, &session.secret);
        }
        Ok(())
    }

    async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> PodiumResult<usize> {
        let mut tables = self.tables.write().await;
        let expired: Vec<SessionId> = tables
            .sessions
            .values()
            .filter(|session| session.is_expired(now))
            .map(|session| session.id)
            .collect();
        for id in &expired {
            if let Some(session) = tables.sessions.remove(id) {
                Self::release_secret(&mut tables, &session.secret);
            }
        }
        Ok(expired.len())
    }

    async fn rotate_service_secret(&self, id: ServiceId) -> PodiumResult<Secret> {
        let new_secret = Secret::generate();
        let mut tables = self.tables.write().await;
        let old_secret = tables
            .services
            .get(&id)
            .ok_or_else(|| PodiumError::not_found(format!("service credential {}", id)))?
            .secret
            .clone();
        Self::claim_secret(&mut tables, &new_secret)?;
        Self::release_secret(&mut tables, &old_secret);
        if let Some(credential) = tables.services.get_mut(&id) {
            credential.secret = new_secret.clone();
        }
        Ok(new_secret)
    }

    async fn rotate_session_secret(
        &self,
        id: SessionId,
        expires_at: DateTime<Utc>,
    ) -> PodiumResult<Secret> {
        let new_secret = Secret::generate();
        let mut tables = self.tables.write().await;
        let old_secret = tables
            .sessions
            .get(&id)
            .ok_or_else(|| PodiumError::not_found(format!("session {}", id)))?
            .secret
            .clone();
        Self::claim_secret(&mut tables, &new_secret)?;
        Self::release_secret(&mut tables, &old_secret);
        if let Some(session) = tables.sessions.get_mut(&id) {
            session.secret = new_secret.clone();
            session.expires_at = expires_at;
        }
        Ok(new_secret)
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn get_account(&self, id: AccountId) -> PodiumResult<Option<Account>> {
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn create_account(&self, account: &Account) -> PodiumResult<()> {
        let mut tables = self.tables.write().await;
        if tables.accounts.contains_key(&account.id) {
            return Err(PodiumError::conflict(format!(
                "account {} already registered",
                account.id
            )));
        }
        tables.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_account(&self, account: &Account) -> PodiumResult<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .accounts
            .get_mut(&account.id)
            .ok_or_else(|| PodiumError::not_found(format!("account {}", account.id)))?;
        stored.name = account.name.clone();
        stored.discriminator = account.discriminator.clone();
        stored.avatar_url = account.avatar_url.clone();
        stored.team = account.team;
        Ok(())
    }

    async fn set_account_permissions(
        &self,
        id: AccountId,
        permissions: PermissionSet,
    ) -> PodiumResult<()> {
        let mut tables = self.tables.write().await;
        let account = tables
            .accounts
            .get_mut(&id)
            .ok_or_else(|| PodiumError::not_found(format!("account {}", id)))?;
        account.permissions = permissions;
        Ok(())
    }

    async fn delete_account(&self, id: AccountId) -> PodiumResult<()> {
        let mut tables = self.tables.write().await;
        if tables.accounts.remove(&id).is_none() {
            return Err(PodiumError::not_found(format!("account {}", id)));
        }
        // Sessions are owned exclusively by their account.
        let orphaned: Vec<SessionId> = tables
            .sessions
            .values()
            .filter(|session| session.account_id == id)
            .map(|session| session.id)
            .collect();
        for session_id in orphaned {
            if let Some(session) = tables.sessions.remove(&session_id) {
                Self::release_secret(&mut tables, &session.secret);
            }
        }
        Ok(())
    }

    async fn get_team(&self, id: TeamId) -> PodiumResult<Option<Team>> {
        Ok(self.tables.read().await.teams.get(&id).cloned())
    }

    async fn create_team(&self, name: &str) -> PodiumResult<Team> {
        let team = Team {
            id: self.next_team_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.tables.write().await.teams.insert(team.id, team.clone());
        Ok(team)
    }

    async fn rename_team(&self, id: TeamId, name: &str) -> PodiumResult<()> {
        let mut tables = self.tables.write().await;
        let team = tables
            .teams
            .get_mut(&id)
            .ok_or_else(|| PodiumError::not_found(format!("team {}", id)))?;
        team.name = name.to_string();
        Ok(())
    }

    async fn delete_team(&self, id: TeamId) -> PodiumResult<()> {
        let mut tables = self.tables.write().await;
        if tables.teams.remove(&id).is_none() {
            return Err(PodiumError::not_found(format!("team {}", id)));
        }
        // Membership is cleared, not cascaded.
        for account in tables.accounts.values_mut() {
            if account.team == Some(id) {
                account.team = None;
            }
        }
        Ok(())
    }

    async fn count_team_members(&self, id: TeamId) -> PodiumResult<usize> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .filter(|account| account.team == Some(id))
            .count())
    }
}
