//! Token claims and the authenticated principal.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity resolved from a valid token.
///
/// Owned by the user store; the session layer only hands it to handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier, used as the token subject.
    pub username: String,

    /// Role names assigned to the user.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            roles: Vec::new(),
        }
    }

    /// The identifier embedded as `sub` in issued tokens.
    pub fn identifier(&self) -> &str {
        &self.username
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Ownership check used by resource endpoints before permitting writes.
    pub fn owns(&self, owner: &str) -> bool {
        self.username == owner
    }
}

/// JWT payload.
///
/// `sub` and `exp` are the registered claims the session layer relies on;
/// everything else the issuer supplied is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal identifier). Optional on decode so a validly signed
    /// token without a subject can be rejected as a credential fault.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// Issuer-supplied claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Build claims from an issuer payload. `sub` and `exp` always win over
    /// same-named keys in `extra`.
    pub fn new(subject: impl Into<String>, exp: i64, mut extra: Map<String, Value>) -> Self {
        extra.remove("sub");
        extra.remove("exp");
        Self {
            sub: Some(subject.into()),
            exp,
            extra,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}
