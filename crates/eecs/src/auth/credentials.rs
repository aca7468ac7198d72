//! Username/password verification against the user store.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

use super::Principal;

/// Stored credential for a single user.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub principal: Principal,
    pub password_hash: String,
    pub is_active: bool,
}

/// User store operations the verifier depends on.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch the credential record for `username`, `None` if unknown.
    async fn credential_record(&self, username: &str) -> anyhow::Result<Option<CredentialRecord>>;

    /// bcrypt cost the store provisions hashes with. Logins for unknown or
    /// inactive users are checked against a placeholder hash of this cost.
    fn hash_cost(&self) -> u32 {
        bcrypt::DEFAULT_COST
    }
}

/// Outcome of a login attempt.
#[must_use]
#[derive(Debug)]
pub enum Verification {
    Verified(Principal),
    /// Unknown user, wrong password or disabled account.
    CredentialMismatch,
    /// The store failed; this is not a credential problem.
    StoreUnavailable(anyhow::Error),
}

/// Checks a username/password pair. Only verifies, never provisions or
/// rehashes stored credentials.
///
/// Every attempt that reaches the store costs one bcrypt verification,
/// whether or not the user exists, so response time does not reveal which
/// usernames are registered.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn CredentialStore>,
    placeholder_hash: Arc<OnceLock<Option<String>>>,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            placeholder_hash: Arc::new(OnceLock::new()),
        }
    }

    pub async fn authenticate(&self, username: &str, password: &str) -> Verification {
        let (stored_hash, principal) = match self.store.credential_record(username).await {
            Ok(Some(record)) if record.is_active => {
                (Some(record.password_hash), Some(record.principal))
            }
            Ok(Some(_)) => {
                debug!(username, "login for inactive user");
                (None, None)
            }
            Ok(None) => {
                debug!(username, "login for unknown user");
                (None, None)
            }
            Err(e) => {
                error!(username, error = %e, "credential lookup failed");
                return Verification::StoreUnavailable(e);
            }
        };

        // bcrypt is CPU-bound; keep it off the async workers.
        let placeholder = self.placeholder_hash.clone();
        let cost = self.store.hash_cost();
        let candidate = password.to_owned();
        let matched = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => verify_password(&hash, &candidate),
            None => {
                if let Some(hash) = placeholder_hash(&placeholder, cost) {
                    let _ = verify_password(hash, &candidate);
                }
                false
            }
        })
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "password verification task failed");
            false
        });

        match principal {
            Some(principal) if matched => Verification::Verified(principal),
            Some(_) => {
                debug!(username, "password mismatch");
                Verification::CredentialMismatch
            }
            None => Verification::CredentialMismatch,
        }
    }
}

/// Hash compared against when the user has no usable credential. Built once,
/// on first use, at the store's cost.
fn placeholder_hash(cell: &OnceLock<Option<String>>, cost: u32) -> Option<&str> {
    cell.get_or_init(|| {
        let seed: [u8; 32] = rand::random();
        bcrypt::hash(hex::encode(seed), cost)
            .map_err(|e| error!(error = %e, cost, "cannot build placeholder hash"))
            .ok()
    })
    .as_deref()
}

/// Hash formats accepted by [`verify_password`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashScheme {
    /// Modular-crypt bcrypt, optionally tagged `bcrypt$`.
    Bcrypt,
    /// `bcrypt_sha256$`: bcrypt over the hex SHA-256 of the password,
    /// which lifts bcrypt's 72-byte input limit.
    BcryptSha256,
}

fn detect_scheme(stored_hash: &str) -> Option<(HashScheme, &str)> {
    if let Some(hash) = stored_hash.strip_prefix("bcrypt_sha256$") {
        Some((HashScheme::BcryptSha256, hash))
    } else if let Some(hash) = stored_hash.strip_prefix("bcrypt$") {
        Some((HashScheme::Bcrypt, hash))
    } else if stored_hash.starts_with("$2") {
        Some((HashScheme::Bcrypt, stored_hash))
    } else {
        None
    }
}

/// Verify `candidate` against a stored hash. Any cost factor and bcrypt
/// revision is accepted; unknown schemes never match.
pub fn verify_password(stored_hash: &str, candidate: &str) -> bool {
    let Some((scheme, hash)) = detect_scheme(stored_hash) else {
        warn!("unrecognised password hash scheme");
        return false;
    };

    let result = match scheme {
        HashScheme::Bcrypt => bcrypt::verify(candidate, hash),
        HashScheme::BcryptSha256 => {
            bcrypt::verify(hex::encode(Sha256::digest(candidate.as_bytes())), hash)
        }
    };

    result.unwrap_or_else(|e| {
        warn!(error = %e, "malformed password hash");
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    // Minimum cost keeps the tests fast.
    const COST: u32 = 4;

    fn bcrypt_hash(password: &str) -> String {
        bcrypt::hash(password, COST).unwrap()
    }

    struct MapStore(HashMap<String, CredentialRecord>);

    #[async_trait]
    impl CredentialStore for MapStore {
        async fn credential_record(
            &self,
            username: &str,
        ) -> anyhow::Result<Option<CredentialRecord>> {
            Ok(self.0.get(username).cloned())
        }

        fn hash_cost(&self) -> u32 {
            COST
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl CredentialStore for BrokenStore {
        async fn credential_record(&self, _: &str) -> anyhow::Result<Option<CredentialRecord>> {
            anyhow::bail!("database is locked")
        }
    }

    fn verifier() -> CredentialVerifier {
        let mut users = HashMap::new();
        users.insert(
            "alice".to_string(),
            CredentialRecord {
                principal: Principal::new("alice"),
                password_hash: bcrypt_hash("wonderland"),
                is_active: true,
            },
        );
        users.insert(
            "bob".to_string(),
            CredentialRecord {
                principal: Principal::new("bob"),
                password_hash: bcrypt_hash("builder"),
                is_active: false,
            },
        );
        CredentialVerifier::new(Arc::new(MapStore(users)))
    }

    #[test]
    fn test_verify_bare_bcrypt() {
        let hash = bcrypt_hash("secret");
        assert!(verify_password(&hash, "secret"));
        assert!(!verify_password(&hash, "Secret"));
    }

    #[test]
    fn test_verify_tagged_bcrypt() {
        let hash = format!("bcrypt${}", bcrypt_hash("secret"));
        assert!(verify_password(&hash, "secret"));
        assert!(!verify_password(&hash, "wrong"));
    }

    #[test]
    fn test_verify_bcrypt_sha256() {
        let digest = hex::encode(Sha256::digest(b"a very long passphrase"));
        let hash = format!("bcrypt_sha256${}", bcrypt_hash(&digest));
        assert!(verify_password(&hash, "a very long passphrase"));
        assert!(!verify_password(&hash, "a very long passphrasf"));
    }

    #[test]
    fn test_verify_accepts_any_cost() {
        let hash = bcrypt::hash("secret", 5).unwrap();
        assert!(verify_password(&hash, "secret"));
    }

    #[test]
    fn test_unknown_scheme_never_matches() {
        assert!(!verify_password("pbkdf2_sha256$260000$salt$hash", "secret"));
        assert!(!verify_password("plaintext", "plaintext"));
        assert!(!verify_password("$2b$garbage", "secret"));
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        match verifier().authenticate("alice", "wonderland").await {
            Verification::Verified(principal) => assert_eq!(principal.username, "alice"),
            other => panic!("expected Verified, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password() {
        assert!(matches!(
            verifier().authenticate("alice", "looking-glass").await,
            Verification::CredentialMismatch
        ));
    }

    #[tokio::test]
    async fn test_authenticate_unknown_user() {
        assert!(matches!(
            verifier().authenticate("carol", "anything").await,
            Verification::CredentialMismatch
        ));
    }

    #[tokio::test]
    async fn test_authenticate_inactive_user() {
        assert!(matches!(
            verifier().authenticate("bob", "builder").await,
            Verification::CredentialMismatch
        ));
    }

    #[tokio::test]
    async fn test_every_rejected_user_pays_for_bcrypt() {
        // A known user with a wrong password is checked against the stored hash.
        let known = verifier();
        let _ = known.authenticate("alice", "looking-glass").await;
        assert!(known.placeholder_hash.get().is_none());

        // Unknown and inactive users are checked against the placeholder.
        for username in ["carol", "bob"] {
            let verifier = verifier();
            assert!(matches!(
                verifier.authenticate(username, "builder").await,
                Verification::CredentialMismatch
            ));
            let placeholder = verifier.placeholder_hash.get().cloned().flatten();
            let placeholder = placeholder.expect("placeholder hash built");
            assert!(placeholder.starts_with("$2b$04$"));
        }
    }

    #[test]
    fn test_placeholder_hash_is_built_once() {
        let cell = OnceLock::new();
        let first = placeholder_hash(&cell, COST).unwrap().to_owned();
        assert_eq!(placeholder_hash(&cell, COST), Some(first.as_str()));
        assert!(!verify_password(&first, ""));
    }

    #[tokio::test]
    async fn test_authenticate_store_failure() {
        let verifier = CredentialVerifier::new(Arc::new(BrokenStore));
        assert!(matches!(
            verifier.authenticate("alice", "wonderland").await,
            Verification::StoreUnavailable(_)
        ));
    }
}
