//! The per-request authorization scope.

use crate::credentials::{ServiceCredential, SessionId};
use crate::directory::{Account, AccountId, TeamId};
use crate::permissions::{Permission, PermissionSet};

/// Who a resolved credential is acting as.
///
/// A scope acts as a service, as an account, or as nobody; the enum
/// keeps any other combination unrepresentable.
#[derive(Debug, Clone)]
pub enum Actor {
    /// An automated integration, acting with its own permissions.
    Service { credential: ServiceCredential },
    /// A human, via a session, acting with the owning account's
    /// permissions. The session id is kept so the holder can rotate or
    /// log out its own credential.
    Account {
        account: Account,
        session_id: SessionId,
    },
    /// No valid credential. Holds no permissions and fails every check.
    Anonymous,
}

/// An immutable capability snapshot for one request.
///
/// The permission set is copied at resolution time: mutating the
/// account's stored permissions afterwards does not affect a scope
/// already handed to a request.
#[derive(Debug, Clone)]
pub struct Scope {
    actor: Actor,
    permissions: PermissionSet,
}

impl Scope {
    /// The anonymous scope: the uniform value for every failed
    /// authentication.
    pub fn anonymous() -> Self {
        Self {
            actor: Actor::Anonymous,
            permissions: PermissionSet::EMPTY,
        }
    }

    /// Resolve a service credential: the snapshot is the credential's
    /// own permission set.
    pub fn for_service(credential: ServiceCredential) -> Self {
        Self {
            permissions: credential.permissions,
            actor: Actor::Service { credential },
        }
    }

    /// Resolve a session against its freshly fetched owning account:
    /// the snapshot is the account's current permission set.
    pub fn for_account(account: Account, session_id: SessionId) -> Self {
        Self {
            permissions: account.permissions,
            actor: Actor::Account {
                account,
                session_id,
            },
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// The permission snapshot taken at resolution time.
    pub fn permissions(&self) -> PermissionSet {
        self.permissions
    }

    pub fn has(&self, flag: Permission) -> bool {
        self.permissions.has(flag)
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self.actor, Actor::Anonymous)
    }

    /// The acting account, if this scope came from a session.
    pub fn account(&self) -> Option<&Account> {
        match &self.actor {
            Actor::Account { account, .. } => Some(account),
            _ => None,
        }
    }

    /// The acting service credential, if any.
    pub fn service(&self) -> Option<&ServiceCredential> {
        match &self.actor {
            Actor::Service { credential } => Some(credential),
            _ => None,
        }
    }

    /// The session that produced this scope, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match &self.actor {
            Actor::Account { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    /// The acting account's team, if any.
    pub fn own_team(&self) -> Option<TeamId> {
        self.account().and_then(|account| account.team)
    }

    /// True iff the scope acts for an account on `team` that holds
    /// `manage_own_team`.
    pub fn owns_team(&self, team: TeamId) -> bool {
        self.own_team() == Some(team) && self.has(Permission::ManageOwnTeam)
    }

    /// True iff the scope acts for the account with this identity.
    pub fn owns_account(&self, account_id: AccountId) -> bool {
        self.account().map(|account| account.id) == Some(account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Secret;
    use chrono::Utc;

    fn account(id: AccountId, team: Option<TeamId>, permissions: PermissionSet) -> Account {
        Account {
            id,
            name: "pol".to_string(),
            discriminator: "0001".to_string(),
            avatar_url: None,
            team,
            permissions,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn anonymous_scope_fails_every_check() {
        let scope = Scope::anonymous();
        assert!(scope.is_anonymous());
        assert!(scope.permissions().is_empty());
        for flag in Permission::ALL {
            assert!(!scope.has(flag));
        }
        assert!(!scope.owns_team(1));
        assert!(!scope.owns_account(1));
    }

    #[test]
    fn service_scope_snapshots_credential_permissions() {
        let credential = ServiceCredential {
            id: 1,
            label: "registrar".to_string(),
            secret: Secret::generate(),
            permissions: PermissionSet::of(&[Permission::AuthenticateUsers]),
            created_at: Utc::now(),
        };
        let scope = Scope::for_service(credential);
        assert!(scope.has(Permission::AuthenticateUsers));
        assert!(scope.account().is_none());
        assert!(scope.session_id().is_none());
        assert!(!scope.owns_team(1));
    }

    #[test]
    fn owns_team_needs_membership_and_flag() {
        let with_flag = Scope::for_account(
            account(5, Some(9), Permission::ManageOwnTeam.into()),
            77,
        );
        assert!(with_flag.owns_team(9));
        assert!(!with_flag.owns_team(8));

        let without_flag = Scope::for_account(account(5, Some(9), PermissionSet::EMPTY), 77);
        assert!(!without_flag.owns_team(9));

        let teamless = Scope::for_account(
            account(5, None, Permission::ManageOwnTeam.into()),
            77,
        );
        assert!(!teamless.owns_team(9));
    }

    #[test]
    fn owns_account_compares_identity() {
        let scope = Scope::for_account(account(5, None, PermissionSet::EMPTY), 77);
        assert!(scope.owns_account(5));
        assert!(!scope.owns_account(6));
        assert_eq!(scope.session_id(), Some(77));
    }

    #[test]
    fn snapshot_is_not_live_linked() {
        let mut acct = account(5, None, Permission::ManageTeams.into());
        let scope = Scope::for_account(acct.clone(), 77);
        acct.permissions = PermissionSet::EMPTY;
        assert!(scope.has(Permission::ManageTeams));
    }
}
