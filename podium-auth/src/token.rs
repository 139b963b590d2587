//! Opaque credential secrets.

use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Number of random bytes behind each secret: 256 bits of entropy.
const SECRET_BYTES: usize = 32;

/// An opaque credential secret.
///
/// Comparison is constant-time, so a secret mismatch takes as long as a
/// match and lookups cannot be used to probe for existing credentials.
/// The value never appears in Debug output.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Generate a fresh secret from the operating system's CSPRNG.
    ///
    /// Entropy is the uniqueness guarantee; no storage lookup is made.
    /// Stores additionally enforce uniqueness at persistence time.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Secret(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// The encoded secret, for handing to the credential holder.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Secret {
    fn from(raw: String) -> Self {
        Secret(raw)
    }
}

impl From<&str> for Secret {
    fn from(raw: &str) -> Self {
        Secret(raw.to_string())
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for Secret {}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_are_distinct() {
        let a = Secret::generate();
        let b = Secret::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn encodes_expected_length_and_alphabet() {
        let secret = Secret::generate();
        // 32 bytes of standard base64: 44 characters including padding.
        assert_eq!(secret.expose().len(), 44);
        assert!(secret
            .expose()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='));
    }

    #[test]
    fn equality_matches_value_not_identity() {
        let secret = Secret::generate();
        let same = Secret::from(secret.expose());
        assert_eq!(secret, same);
        assert_ne!(secret, Secret::from("not the secret"));
    }

    #[test]
    fn debug_output_is_redacted() {
        let secret = Secret::generate();
        let debug = format!("{:?}", secret);
        assert!(!debug.contains(secret.expose()));
    }
}
