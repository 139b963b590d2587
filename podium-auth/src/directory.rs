//! Member directory entities: accounts and the teams they belong to.

use crate::permissions::PermissionSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type AccountId = i64;
pub type TeamId = i64;

/// A member account.
///
/// The id is assigned by the upstream identity provider, not generated
/// locally. Team membership is optional; deleting a team clears the
/// reference on its members rather than deleting them.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub discriminator: String,
    pub avatar_url: Option<String>,
    pub team: Option<TeamId>,
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
}

/// A team of accounts. Holds no references of its own; membership lives
/// on the account.
#[derive(Debug, Clone)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// API view of a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamView {
    pub id: TeamId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub member_count: usize,
}

impl TeamView {
    pub fn new(team: &Team, member_count: usize) -> Self {
        Self {
            id: team.id,
            name: team.name.clone(),
            created_at: team.created_at,
            member_count,
        }
    }
}

/// API view of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountView {
    pub id: AccountId,
    pub name: String,
    pub discriminator: String,
    pub avatar_url: Option<String>,
    pub team: Option<TeamView>,
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
}

impl AccountView {
    pub fn new(account: &Account, team: Option<TeamView>) -> Self {
        Self {
            id: account.id,
            name: account.name.clone(),
            discriminator: account.discriminator.clone(),
            avatar_url: account.avatar_url.clone(),
            team,
            permissions: account.permissions,
            created_at: account.created_at,
        }
    }
}
