//! Signed, time-limited access tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{AuthError, Claims, SessionConfig};

/// Lifetime used when the issuer does not ask for one.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::minutes(15);

/// Token decoding failures.
///
/// The distinction only matters for logs; callers see
/// [`AuthError::InvalidCredentials`] either way.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),
}

impl From<TokenError> for AuthError {
    fn from(_: TokenError) -> Self {
        AuthError::InvalidCredentials
    }
}

/// Encodes and decodes JWTs with the configured secret and algorithm.
///
/// Holds nothing but keys derived from the session configuration.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(config: &SessionConfig) -> Self {
        let secret = config.secret().as_bytes();
        let algorithm = config.algorithm();

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a token for `subject` carrying `claims`, expiring after `ttl`
    /// (15 minutes when `None`).
    pub fn issue(
        &self,
        subject: &str,
        claims: Map<String, Value>,
        ttl: Option<Duration>,
    ) -> Result<String, AuthError> {
        let ttl = ttl.unwrap_or(DEFAULT_TOKEN_TTL);
        let exp = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::Internal(format!("token lifetime {ttl} out of range")))?
            .timestamp();
        self.encode_claims(&Claims::new(subject, exp, claims))
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Verify signature, algorithm and expiry, then return the payload.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }
}
