//! Podium Auth - credential resolution and permission delegation
//!
//! This crate decides, for every incoming request, who is acting and
//! what they are permitted to mutate. Two credential kinds exist: long-
//! lived service credentials ("apps") and expiring user sessions, both
//! presented as an HTTP-Basic-style pair of tagged identifier and
//! secret. Resolution produces an immutable [`Scope`] snapshot; the
//! delegation guard then decides whether a scope may grant or revoke
//! permission bits on someone else.
//!
//! The crate is a library for request handlers; it owns no wire
//! protocol. Failed authentication is not an error: it collapses to
//! the anonymous scope, which holds no permissions and fails every
//! check.

pub mod authenticator;
pub mod credentials;
pub mod delegation;
pub mod directory;
pub mod permissions;
pub mod scope;
pub mod service;
pub mod store;
pub mod token;

pub use authenticator::Authenticator;
pub use credentials::{
    ServiceCredential, ServiceCredentialView, ServiceId, SessionId, SessionView, UserCredential,
};
pub use delegation::can_alter_permissions;
pub use directory::{Account, AccountId, AccountView, Team, TeamId, TeamView};
pub use permissions::{CredentialKind, Permission, PermissionSet};
pub use scope::{Actor, Scope};
pub use service::{AccountPatch, AuthService, CredentialView, NewAccount};
pub use store::{CredentialStore, DirectoryStore, MemoryStore};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use token::Secret;
