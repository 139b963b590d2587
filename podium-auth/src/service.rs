//! Application-level operations composing the scope checks, the
//! delegation guard and the stores.
//!
//! The guards themselves only answer booleans; this layer turns a
//! refusal into [`PodiumError::Forbidden`] and applies the mutation.

use crate::credentials::{ServiceCredentialView, ServiceId, SessionView};
use crate::delegation::can_alter_permissions;
use crate::directory::{Account, AccountId, AccountView, Team, TeamId, TeamView};
use crate::permissions::{CredentialKind, Permission, PermissionSet};
use crate::scope::{Actor, Scope};
use crate::store::{CredentialStore, DirectoryStore};
use chrono::Utc;
use podium_core::{PodiumError, PodiumResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Fields for registering a new account.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    /// Externally-assigned identity.
    pub id: AccountId,
    pub name: String,
    pub discriminator: String,
    pub avatar_url: Option<String>,
    pub team: Option<TeamId>,
    /// Initial permission grant; must pass the delegation guard.
    #[serde(default)]
    pub permissions: PermissionSet,
}

/// A partial update to an account. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub discriminator: Option<String>,
    /// `Some(None)` clears the avatar.
    pub avatar_url: Option<Option<String>>,
    /// `Some(None)` removes the account from its team.
    pub team: Option<Option<TeamId>>,
    #[serde(default)]
    pub grant: PermissionSet,
    #[serde(default)]
    pub revoke: PermissionSet,
}

/// The credential behind a scope, as returned by `whoami` and
/// `rotate_own_token`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CredentialView {
    Service(ServiceCredentialView),
    Session(SessionView),
    Account(AccountView),
}

/// High-level authorization operations over the stores.
#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    directory: Arc<dyn DirectoryStore>,
    session_lifetime: chrono::Duration,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        directory: Arc<dyn DirectoryStore>,
        session_lifetime: chrono::Duration,
    ) -> Self {
        Self {
            credentials,
            directory,
            session_lifetime,
        }
    }

    fn require(&self, scope: &Scope, flag: Permission) -> PodiumResult<()> {
        if scope.has(flag) {
            Ok(())
        } else {
            Err(PodiumError::forbidden(format!(
                "requires the {} permission",
                flag
            )))
        }
    }

    async fn team_view(&self, team: &Team) -> PodiumResult<TeamView> {
        let members = self.directory.count_team_members(team.id).await?;
        Ok(TeamView::new(team, members))
    }

    async fn account_view(&self, account: &Account) -> PodiumResult<AccountView> {
        let team = match account.team {
            Some(team_id) => match self.directory.get_team(team_id).await? {
                Some(team) => Some(self.team_view(&team).await?),
                None => None,
            },
            None => None,
        };
        Ok(AccountView::new(account, team))
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Issue a session for an account. Requires `authenticate_users`,
    /// so only trusted sign-in services can mint sessions.
    ///
    /// The returned view is the only place the secret ever appears.
    pub async fn issue_session(
        &self,
        scope: &Scope,
        account_id: AccountId,
    ) -> PodiumResult<SessionView> {
        self.require(scope, Permission::AuthenticateUsers)?;
        let expires_at = Utc::now() + self.session_lifetime;
        let session = self.credentials.create_session(account_id, expires_at).await?;
        info!(session = session.id, account = account_id, "issued session");
        Ok(SessionView::with_secret(&session))
    }

    /// Rotate the secret of whatever credential authenticated this
    /// scope. For sessions the expiry clock is reset as well.
    pub async fn rotate_own_token(&self, scope: &Scope) -> PodiumResult<CredentialView> {
        match scope.actor() {
            Actor::Service { credential } => {
                let secret = self
                    .credentials
                    .rotate_service_secret(credential.id)
                    .await?;
                info!(service = credential.id, "rotated service secret");
                let mut rotated = credential.clone();
                rotated.secret = secret;
                Ok(CredentialView::Service(ServiceCredentialView::with_secret(
                    &rotated,
                )))
            }
            Actor::Account { session_id, .. } => {
                let expires_at = Utc::now() + self.session_lifetime;
                let secret = self
                    .credentials
                    .rotate_session_secret(*session_id, expires_at)
                    .await?;
                info!(session = session_id, "rotated session secret");
                Ok(CredentialView::Session(SessionView {
                    username: format!("S{}", session_id),
                    password: secret.expose().to_string(),
                    expires_at,
                }))
            }
            Actor::Anonymous => Err(PodiumError::forbidden(
                "a token was not used to authenticate",
            )),
        }
    }

    /// Destroy the session behind this scope.
    pub async fn logout(&self, scope: &Scope) -> PodiumResult<()> {
        match scope.session_id() {
            Some(session_id) => {
                self.credentials.delete_session(session_id).await?;
                info!(session = session_id, "logged out");
                Ok(())
            }
            None => Err(PodiumError::forbidden(
                "a user session was not used to authenticate",
            )),
        }
    }

    /// Delete every expired session. Safe to run at any time; expiry is
    /// otherwise only evaluated lazily during authentication.
    pub async fn prune_sessions(&self) -> PodiumResult<usize> {
        let pruned = self.credentials.prune_expired_sessions(Utc::now()).await?;
        info!(pruned, "pruned expired sessions");
        Ok(pruned)
    }

    /// Describe the credential behind a scope.
    pub async fn whoami(&self, scope: &Scope) -> PodiumResult<CredentialView> {
        match scope.actor() {
            Actor::Service { credential } => Ok(CredentialView::Service(
                ServiceCredentialView::new(credential),
            )),
            Actor::Account { account, .. } => {
                Ok(CredentialView::Account(self.account_view(account).await?))
            }
            Actor::Anonymous => Err(PodiumError::forbidden(
                "a token was not used to authenticate",
            )),
        }
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Register a new account, optionally with an initial permission
    /// grant checked through the delegation guard.
    pub async fn register_account(
        &self,
        scope: &Scope,
        new_account: NewAccount,
    ) -> PodiumResult<AccountView> {
        self.require(scope, Permission::ManageAccountDetails)?;
        new_account.permissions.validate_for(CredentialKind::Account)?;

        if let Some(team_id) = new_account.team {
            if self.directory.get_team(team_id).await?.is_none() {
                return Err(PodiumError::not_found(format!("team {}", team_id)));
            }
        }

        if !new_account.permissions.is_empty()
            && !can_alter_permissions(scope, new_account.team, new_account.permissions)
        {
            return Err(PodiumError::forbidden(
                "cannot grant permissions outside your own scope",
            ));
        }

        let account = Account {
            id: new_account.id,
            name: new_account.name,
            discriminator: new_account.discriminator,
            avatar_url: new_account.avatar_url,
            team: new_account.team,
            permissions: new_account.permissions,
            created_at: Utc::now(),
        };
        self.directory.create_account(&account).await?;
        info!(account = account.id, "registered account");
        self.account_view(&account).await
    }

    /// Apply a partial update to an account.
    ///
    /// Details need `manage_account_details`; a team change needs
    /// `manage_account_teams` or ownership of the team being joined
    /// (or, when leaving, the team being left); a permission delta goes
    /// through the delegation guard against the account's team after
    /// the move.
    pub async fn update_account(
        &self,
        scope: &Scope,
        account_id: AccountId,
        patch: AccountPatch,
    ) -> PodiumResult<AccountView> {
        let mut account = self
            .directory
            .get_account(account_id)
            .await?
            .ok_or_else(|| PodiumError::not_found(format!("account {}", account_id)))?;

        if patch.name.is_some() || patch.discriminator.is_some() || patch.avatar_url.is_some() {
            self.require(scope, Permission::ManageAccountDetails)?;
        }
        if let Some(name) = patch.name {
            account.name = name;
        }
        if let Some(discriminator) = patch.discriminator {
            account.discriminator = discriminator;
        }
        if let Some(avatar_url) = patch.avatar_url {
            account.avatar_url = avatar_url;
        }

        if let Some(team) = patch.team {
            let affected = match team {
                Some(destination) => {
                    if self.directory.get_team(destination).await?.is_none() {
                        return Err(PodiumError::not_found(format!("team {}", destination)));
                    }
                    Some(destination)
                }
                // Leaving a team: ownership of the team being left
                // counts.
                None => account.team,
            };
            let owns_affected = affected.is_some_and(|team_id| scope.owns_team(team_id));
            if !scope.has(Permission::ManageAccountTeams) && !owns_affected {
                return Err(PodiumError::forbidden(
                    "requires the manage_account_teams permission or ownership of the team",
                ));
            }
            account.team = team;
        }

        let delta = patch.grant.union(patch.revoke);
        if !delta.is_empty() {
            patch.grant.validate_for(CredentialKind::Account)?;
            if !can_alter_permissions(scope, account.team, delta) {
                return Err(PodiumError::forbidden(
                    "cannot alter permissions outside your own scope",
                ));
            }
        }

        self.directory.update_account(&account).await?;
        if !delta.is_empty() {
            let updated = account.permissions.union(patch.grant).without(patch.revoke);
            self.directory
                .set_account_permissions(account.id, updated)
                .await?;
            account.permissions = updated;
        }

        info!(account = account.id, "updated account");
        self.account_view(&account).await
    }

    /// Delete an account; its sessions go with it.
    pub async fn delete_account(&self, scope: &Scope, account_id: AccountId) -> PodiumResult<()> {
        self.require(scope, Permission::ManageAccountDetails)?;
        self.directory.delete_account(account_id).await?;
        info!(account = account_id, "deleted account");
        Ok(())
    }

    pub async fn account(&self, account_id: AccountId) -> PodiumResult<AccountView> {
        let account = self
            .directory
            .get_account(account_id)
            .await?
            .ok_or_else(|| PodiumError::not_found(format!("account {}", account_id)))?;
        self.account_view(&account).await
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    pub async fn create_team(&self, scope: &Scope, name: &str) -> PodiumResult<TeamView> {
        self.require(scope, Permission::ManageTeams)?;
        let team = self.directory.create_team(name).await?;
        info!(team = team.id, name, "created team");
        self.team_view(&team).await
    }

    /// Rename a team: the global flag or ownership of this team.
    pub async fn rename_team(
        &self,
        scope: &Scope,
        team_id: TeamId,
        name: &str,
    ) -> PodiumResult<TeamView> {
        if !scope.has(Permission::ManageTeams) && !scope.owns_team(team_id) {
            return Err(PodiumError::forbidden(
                "requires the manage_teams permission or ownership of the team",
            ));
        }
        self.directory.rename_team(team_id, name).await?;
        let team = self
            .directory
            .get_team(team_id)
            .await?
            .ok_or_else(|| PodiumError::not_found(format!("team {}", team_id)))?;
        self.team_view(&team).await
    }

    /// Delete a team: the global flag or ownership of this team.
    /// Members stay, teamless.
    pub async fn delete_team(&self, scope: &Scope, team_id: TeamId) -> PodiumResult<()> {
        if !scope.has(Permission::ManageTeams) && !scope.owns_team(team_id) {
            return Err(PodiumError::forbidden(
                "requires the manage_teams permission or ownership of the team",
            ));
        }
        self.directory.delete_team(team_id).await?;
        info!(team = team_id, "deleted team");
        Ok(())
    }

    pub async fn team(&self, team_id: TeamId) -> PodiumResult<TeamView> {
        let team = self
            .directory
            .get_team(team_id)
            .await?
            .ok_or_else(|| PodiumError::not_found(format!("team {}", team_id)))?;
        self.team_view(&team).await
    }

    // ------------------------------------------------------------------
    // Service credential provisioning
    // ------------------------------------------------------------------
    //
    // These back the operator CLI, which talks to the store directly;
    // they are not scope-guarded.

    /// Mint a service credential. The secret appears in the returned
    /// view and nowhere else.
    pub async fn create_service(
        &self,
        label: &str,
        permissions: PermissionSet,
    ) -> PodiumResult<ServiceCredentialView> {
        permissions.validate_for(CredentialKind::Service)?;
        let credential = self.credentials.create_service(label, permissions).await?;
        Ok(ServiceCredentialView::with_secret(&credential))
    }

    /// Edit a service credential: relabel, grant/revoke flags, rotate
    /// the secret. The view carries the new secret only when rotated.
    pub async fn edit_service(
        &self,
        id: ServiceId,
        label: Option<&str>,
        grant: PermissionSet,
        revoke: PermissionSet,
        rotate: bool,
    ) -> PodiumResult<ServiceCredentialView> {
        grant.validate_for(CredentialKind::Service)?;
        let current = self
            .credentials
            .get_service(id)
            .await?
            .ok_or_else(|| PodiumError::not_found(format!("service credential {}", id)))?;

        let permissions = current.permissions.union(grant).without(revoke);
        self.credentials
            .update_service(id, label, Some(permissions))
            .await?;

        let rotated_secret = if rotate {
            Some(self.credentials.rotate_service_secret(id).await?)
        } else {
            None
        };

        let mut updated = self
            .credentials
            .get_service(id)
            .await?
            .ok_or_else(|| PodiumError::not_found(format!("service credential {}", id)))?;
        Ok(match rotated_secret {
            Some(secret) => {
                updated.secret = secret;
                ServiceCredentialView::with_secret(&updated)
            }
            None => ServiceCredentialView::new(&updated),
        })
    }

    pub async fn service_credential(&self, id: ServiceId) -> PodiumResult<ServiceCredentialView> {
        let credential = self
            .credentials
            .get_service(id)
            .await?
            .ok_or_else(|| PodiumError::not_found(format!("service credential {}", id)))?;
        Ok(ServiceCredentialView::new(&credential))
    }

    pub async fn delete_service(&self, id: ServiceId) -> PodiumResult<()> {
        self.credentials.delete_service(id).await?;
        info!(service = id, "deleted service credential");
        Ok(())
    }

    pub async fn list_services(&self) -> PodiumResult<Vec<ServiceCredentialView>> {
        let services = self.credentials.list_services().await?;
        Ok(services.iter().map(ServiceCredentialView::new).collect())
    }

    /// Grant an account every flag an account may hold. Operator
    /// convenience for bootstrapping the first administrator.
    pub async fn make_superuser(&self, account_id: AccountId) -> PodiumResult<AccountView> {
        let account = self
            .directory
            .get_account(account_id)
            .await?
            .ok_or_else(|| PodiumError::not_found(format!("account {}", account_id)))?;
        let permissions = CredentialKind::Account.allowed();
        self.directory
            .set_account_permissions(account_id, permissions)
            .await?;
        info!(account = account_id, "granted all account permissions");
        let account = Account {
            permissions,
            ..account
        };
        self.account_view(&account).await
    }
}
