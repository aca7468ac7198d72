//! Authentication module.
//!
//! Provides the JWT session pipeline:
//! - credential verification against the user store
//! - token issue/decode
//! - token extraction from cookie and/or `Authorization` header
//! - per-request session resolution exposed as the [`CurrentUser`] extractor

mod claims;
mod codec;
mod config;
mod credentials;
mod error;
mod extract;
mod middleware;
mod resolver;

pub use claims::{Claims, Principal};
pub use codec::{DEFAULT_TOKEN_TTL, TokenCodec, TokenError};
pub use config::{
    AuthConfig, ConfigValidationError, DEFAULT_COOKIE_NAME, DEFAULT_TOKEN_URL,
    LOGIN_TOKEN_TTL_HOURS, MAX_TOKEN_TTL_HOURS, NotAuthenticatedConfig, NotAuthenticatedFault,
    SessionConfig, TokenSources,
};
pub use credentials::{
    CredentialRecord, CredentialStore, CredentialVerifier, Verification, verify_password,
};
pub use error::{AuthError, AuthErrorResponse};
pub use extract::extract_token;
pub use middleware::{AuthState, CurrentUser};
pub use resolver::{SessionResolver, SessionState, UserLookup};
