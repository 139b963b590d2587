//! The two credential kinds: service credentials and user sessions.

use crate::directory::AccountId;
use crate::permissions::PermissionSet;
use crate::token::Secret;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ServiceId = i64;
pub type SessionId = i64;

/// A long-lived credential for an automated integration ("app").
///
/// Holds its own permission bitfield and never expires; it is removed
/// only by explicit deletion. The secret can be rotated, which
/// invalidates the old secret immediately.
#[derive(Debug, Clone)]
pub struct ServiceCredential {
    pub id: ServiceId,
    pub label: String,
    pub secret: Secret,
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
}

impl ServiceCredential {
    /// The identifier presented as the username half of a credential
    /// pair.
    pub fn identifier(&self) -> String {
        format!("A{}", self.id)
    }
}

/// An expiring credential bound to exactly one account ("session").
///
/// Carries no permissions of its own; the owning account's bitfield is
/// snapshotted at resolution time. Rotation replaces the secret and
/// resets the expiry clock.
#[derive(Debug, Clone)]
pub struct UserCredential {
    pub id: SessionId,
    pub account_id: AccountId,
    pub secret: Secret,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl UserCredential {
    pub fn identifier(&self) -> String {
        format!("S{}", self.id)
    }

    /// Expiry is evaluated lazily against the caller's clock; there is
    /// no background timer.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// API view of a service credential. The secret is only present on the
/// operations that mint or rotate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCredentialView {
    pub username: String,
    pub label: String,
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ServiceCredentialView {
    pub fn new(credential: &ServiceCredential) -> Self {
        Self {
            username: credential.identifier(),
            label: credential.label.clone(),
            permissions: credential.permissions,
            created_at: credential.created_at,
            password: None,
        }
    }

    /// Include the secret; used exactly once per mint or rotation.
    pub fn with_secret(credential: &ServiceCredential) -> Self {
        Self {
            password: Some(credential.secret.expose().to_string()),
            ..Self::new(credential)
        }
    }
}

/// API view of a session, as returned when one is issued or rotated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub username: String,
    pub password: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionView {
    pub fn with_secret(session: &UserCredential) -> Self {
        Self {
            username: session.identifier(),
            password: session.secret.expose().to_string(),
            expires_at: session.expires_at,
        }
    }
}
