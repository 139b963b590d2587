//! Credential resolution: from a presented identifier and secret to a
//! [`Scope`].

use crate::credentials::{ServiceId, SessionId};
use crate::scope::Scope;
use crate::store::{CredentialStore, DirectoryStore};
use crate::token::Secret;
use podium_core::PodiumResult;
use std::sync::Arc;
use tracing::{debug, warn};

/// The parsed form of a presented identifier.
///
/// The first character tags the credential kind (case-insensitive), the
/// rest is a decimal id: `A17` is service credential 17, `s204` is
/// session 204.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Identifier {
    Service(ServiceId),
    Session(SessionId),
}

impl Identifier {
    fn parse(raw: &str) -> Option<Identifier> {
        let tag = raw.chars().next()?;
        let id: i64 = raw[tag.len_utf8()..].parse().ok()?;
        match tag.to_ascii_uppercase() {
            'A' => Some(Identifier::Service(id)),
            'S' => Some(Identifier::Session(id)),
            _ => None,
        }
    }
}

/// Resolves presented credentials against the stores.
///
/// Stateless between requests: every call re-reads the credential, so
/// concurrent-request correctness reduces to the store's atomicity.
#[derive(Clone)]
pub struct Authenticator {
    credentials: Arc<dyn CredentialStore>,
    directory: Arc<dyn DirectoryStore>,
}

impl Authenticator {
    pub fn new(credentials: Arc<dyn CredentialStore>, directory: Arc<dyn DirectoryStore>) -> Self {
        Self {
            credentials,
            directory,
        }
    }

    /// Resolve an identifier and secret to a scope.
    ///
    /// Every authentication failure (malformed identifier, unknown
    /// credential, secret mismatch, expired session) collapses to the
    /// anonymous scope; it is the normal "not authorized" outcome, not
    /// an error. Only a storage fault returns `Err`.
    ///
    /// An expired session is deleted on sight (lazy reap). The reap is
    /// best-effort: if the delete fails the session is simply seen as
    /// expired again next time.
    pub async fn authenticate(&self, identifier: &str, secret: &str) -> PodiumResult<Scope> {
        let parsed = match Identifier::parse(identifier) {
            Some(parsed) => parsed,
            None => {
                debug!(identifier, "malformed credential identifier");
                return Ok(Scope::anonymous());
            }
        };
        let secret = Secret::from(secret);

        match parsed {
            Identifier::Service(id) => {
                match self.credentials.find_service(id, &secret).await? {
                    Some(credential) => Ok(Scope::for_service(credential)),
                    None => Ok(Scope::anonymous()),
                }
            }
            Identifier::Session(id) => {
                let session = match self.credentials.find_session(id, &secret).await? {
                    Some(session) => session,
                    None => return Ok(Scope::anonymous()),
                };

                if session.is_expired(chrono::Utc::now()) {
                    if let Err(err) = self.credentials.delete_session(session.id).await {
                        warn!(session = session.id, error = %err, "failed to reap expired session");
                    } else {
                        debug!(session = session.id, "reaped expired session");
                    }
                    return Ok(Scope::anonymous());
                }

                // The account is fetched fresh so the snapshot reflects
                // its current permissions and team.
                match self.directory.get_account(session.account_id).await? {
                    Some(account) => Ok(Scope::for_account(account, session.id)),
                    None => {
                        // Orphaned session; the cascade should have
                        // removed it. Treat like any stale credential.
                        warn!(
                            session = session.id,
                            account = session.account_id,
                            "session owner no longer exists"
                        );
                        if let Err(err) = self.credentials.delete_session(session.id).await {
                            warn!(session = session.id, error = %err, "failed to remove orphaned session");
                        }
                        Ok(Scope::anonymous())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_identifiers() {
        assert_eq!(Identifier::parse("A17"), Some(Identifier::Service(17)));
        assert_eq!(Identifier::parse("a17"), Some(Identifier::Service(17)));
        assert_eq!(Identifier::parse("S204"), Some(Identifier::Session(204)));
        assert_eq!(Identifier::parse("s204"), Some(Identifier::Session(204)));
    }

    #[test]
    fn rejects_malformed_identifiers() {
        assert_eq!(Identifier::parse(""), None);
        assert_eq!(Identifier::parse("A"), None);
        assert_eq!(Identifier::parse("X17"), None);
        assert_eq!(Identifier::parse("17"), None);
        assert_eq!(Identifier::parse("Aseventeen"), None);
        assert_eq!(Identifier::parse("A17x"), None);
        assert_eq!(Identifier::parse("é17"), None);
    }
}
