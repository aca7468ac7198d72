//! Authentication configuration.
//!
//! [`AuthConfig`] is the serializable form read from the config file.
//! [`SessionConfig`] is the validated, immutable form built once at startup
//! and shared by reference with the codec, extractor and resolver.

use std::fmt;

use axum::http::StatusCode;
use chrono::Duration;
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default cookie carrying the access token.
pub const DEFAULT_COOKIE_NAME: &str = "access-token";

/// Default login path.
pub const DEFAULT_TOKEN_URL: &str = "/auth/token";

/// Lifetime of tokens issued by the login endpoint.
pub const LOGIN_TOKEN_TTL_HOURS: i64 = 12;

/// Upper bound for `token_ttl_hours` (one year).
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

/// Routes the login endpoint must not shadow.
const RESERVED_PATHS: &[&str] = &["/ping", "/auth/logout", "/auth/protected", "/auth/user/info"];

const MIN_SECRET_LEN: usize = 32;
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Secret used to sign tokens. REQUIRED; `env:VAR_NAME` reads it from
    /// the environment.
    pub jwt_secret: Option<String>,

    /// Signing algorithm (HS256, HS384 or HS512).
    pub algorithm: String,

    /// Look for the token in a cookie.
    pub use_cookie: bool,

    /// Look for the token in the `Authorization: Bearer` header.
    pub use_header: bool,

    /// Name of the token cookie.
    pub cookie_name: String,

    /// Path of the login endpoint.
    pub token_url: String,

    /// Lifetime of login tokens, in hours.
    pub token_ttl_hours: i64,

    /// bcrypt cost used when provisioning password hashes.
    pub bcrypt_cost: u32,

    /// Replaces the standard 401 challenge raised when no token is present.
    pub not_authenticated: Option<NotAuthenticatedConfig>,

    /// Allowed CORS origins, e.g. `["http://localhost:9528"]` for an admin
    /// frontend served from another origin. Credentials are allowed for the
    /// listed origins. If empty, every cross-origin request is denied, so a
    /// separately hosted frontend must be listed here.
    pub allowed_origins: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // No default secret - must be explicitly configured
            jwt_secret: None,
            algorithm: "HS256".to_string(),
            use_cookie: false,
            use_header: true,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            token_ttl_hours: LOGIN_TOKEN_TTL_HOURS,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            not_authenticated: None,
            allowed_origins: Vec::new(),
        }
    }
}

/// Custom response for requests that carry no token at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotAuthenticatedConfig {
    pub status: u16,
    pub detail: String,
}

impl AuthConfig {
    /// Resolve the JWT secret, expanding `env:VAR_NAME` syntax.
    pub fn resolve_jwt_secret(&self) -> Result<Option<String>, ConfigValidationError> {
        match &self.jwt_secret {
            None => Ok(None),
            Some(value) => {
                if let Some(var_name) = value.strip_prefix("env:") {
                    match std::env::var(var_name) {
                        Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
                        Ok(_) => Err(ConfigValidationError::EnvVarEmpty(var_name.to_string())),
                        Err(_) => Err(ConfigValidationError::EnvVarNotFound(var_name.to_string())),
                    }
                } else {
                    Ok(Some(value.clone()))
                }
            }
        }
    }

    /// Validate the configuration and freeze it into a [`SessionConfig`].
    pub fn session_config(&self) -> Result<SessionConfig, ConfigValidationError> {
        let secret = self
            .resolve_jwt_secret()?
            .ok_or(ConfigValidationError::MissingJwtSecret)?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigValidationError::JwtSecretTooShort);
        }

        let algorithm = parse_algorithm(&self.algorithm)?;

        let sources = TokenSources {
            cookie: self.use_cookie,
            header: self.use_header,
        };
        if !sources.any() {
            return Err(ConfigValidationError::NoTokenSource);
        }

        if self.use_cookie && self.cookie_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyCookieName);
        }

        if !self.token_url.starts_with('/')
            || self.token_url.contains(['{', '}', '*'])
            || RESERVED_PATHS.contains(&self.token_url.as_str())
        {
            return Err(ConfigValidationError::InvalidTokenUrl(self.token_url.clone()));
        }

        let token_ttl = Some(self.token_ttl_hours)
            .filter(|hours| (1..=MAX_TOKEN_TTL_HOURS).contains(hours))
            .and_then(Duration::try_hours)
            .ok_or(ConfigValidationError::InvalidTokenTtl(self.token_ttl_hours))?;

        let not_authenticated = match &self.not_authenticated {
            None => NotAuthenticatedFault::Challenge,
            Some(custom) => {
                let status = StatusCode::from_u16(custom.status)
                    .map_err(|_| ConfigValidationError::InvalidStatus(custom.status))?;
                NotAuthenticatedFault::Custom {
                    status,
                    detail: custom.detail.clone(),
                }
            }
        };

        Ok(SessionConfig {
            secret,
            algorithm,
            sources,
            cookie_name: self.cookie_name.clone(),
            token_url: self.token_url.clone(),
            token_ttl,
            not_authenticated,
        })
    }

    /// Check the provisioning settings that are not part of the session.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.bcrypt_cost) {
            return Err(ConfigValidationError::InvalidBcryptCost(self.bcrypt_cost));
        }
        self.session_config().map(|_| ())
    }

    /// Generate a random secret suitable for `jwt_secret`.
    pub fn generate_jwt_secret() -> String {
        use rand::Rng;

        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        const SECRET_LENGTH: usize = 64;

        let mut rng = rand::rng();
        (0..SECRET_LENGTH)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }
}

fn parse_algorithm(name: &str) -> Result<Algorithm, ConfigValidationError> {
    match name.parse::<Algorithm>() {
        Ok(alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)) => Ok(alg),
        _ => Err(ConfigValidationError::UnsupportedAlgorithm(name.to_string())),
    }
}

/// Configuration validation errors. All of them are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error(
        "JWT secret is required. Set EECS__AUTH__JWT_SECRET or auth.jwt_secret in config."
    )]
    MissingJwtSecret,

    #[error("JWT secret must be at least 32 characters long.")]
    JwtSecretTooShort,

    #[error("Environment variable '{0}' not found (referenced via env:{0} in config).")]
    EnvVarNotFound(String),

    #[error("Environment variable '{0}' is empty (referenced via env:{0} in config).")]
    EnvVarEmpty(String),

    #[error("Unsupported signing algorithm '{0}'; expected HS256, HS384 or HS512.")]
    UnsupportedAlgorithm(String),

    #[error("use_cookie and use_header are both false; one of them must be enabled.")]
    NoTokenSource,

    #[error("cookie_name must not be empty when use_cookie is enabled.")]
    EmptyCookieName,

    #[error(
        "token_url must be a literal absolute path not used by another route, got '{0}'."
    )]
    InvalidTokenUrl(String),

    #[error("token_ttl_hours must be between 1 and 8760 (one year), got {0}.")]
    InvalidTokenTtl(i64),

    #[error("bcrypt_cost must be between 4 and 31, got {0}.")]
    InvalidBcryptCost(u32),

    #[error("{0} is not a valid HTTP status for not_authenticated.")]
    InvalidStatus(u16),
}

/// Which request parts may carry the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSources {
    pub cookie: bool,
    pub header: bool,
}

impl TokenSources {
    pub fn any(&self) -> bool {
        self.cookie || self.header
    }
}

/// Fault raised when a request carries no token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NotAuthenticatedFault {
    /// 401 with `WWW-Authenticate: Bearer`.
    #[default]
    Challenge,
    /// Application-defined response. No challenge header is sent.
    Custom { status: StatusCode, detail: String },
}

/// Validated session configuration.
#[derive(Clone)]
pub struct SessionConfig {
    secret: String,
    algorithm: Algorithm,
    sources: TokenSources,
    cookie_name: String,
    token_url: String,
    token_ttl: Duration,
    not_authenticated: NotAuthenticatedFault,
}

impl SessionConfig {
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn sources(&self) -> TokenSources {
        self.sources
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Lifetime of tokens issued by the login endpoint.
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    pub fn not_authenticated(&self) -> &NotAuthenticatedFault {
        &self.not_authenticated
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("sources", &self.sources)
            .field("cookie_name", &self.cookie_name)
            .field("token_url", &self.token_url)
            .field("token_ttl", &self.token_ttl)
            .field("not_authenticated", &self.not_authenticated)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::field_reassign_with_default)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-for-unit-tests-minimum-32-chars-long";

    fn config_with_secret() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.jwt_secret = Some(SECRET.to_string());
        config
    }

    #[test]
    fn test_defaults() {
        let session = config_with_secret().session_config().unwrap();
        assert_eq!(session.algorithm(), Algorithm::HS256);
        assert_eq!(session.cookie_name(), "access-token");
        assert_eq!(session.token_url(), "/auth/token");
        assert_eq!(session.token_ttl(), Duration::hours(12));
        assert_eq!(
            session.sources(),
            TokenSources {
                cookie: false,
                header: true
            }
        );
        assert_eq!(session.not_authenticated(), &NotAuthenticatedFault::Challenge);
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let err = AuthConfig::default().session_config().unwrap_err();
        assert_eq!(err, ConfigValidationError::MissingJwtSecret);
    }

    #[test]
    fn test_short_secret_is_fatal() {
        let mut config = AuthConfig::default();
        config.jwt_secret = Some("short".to_string());
        assert_eq!(
            config.session_config().unwrap_err(),
            ConfigValidationError::JwtSecretTooShort
        );
    }

    #[test]
    fn test_no_token_source_is_fatal() {
        let mut config = config_with_secret();
        config.use_cookie = false;
        config.use_header = false;
        assert_eq!(
            config.session_config().unwrap_err(),
            ConfigValidationError::NoTokenSource
        );
    }

    #[test]
    fn test_unsupported_algorithm() {
        let mut config = config_with_secret();
        config.algorithm = "RS256".to_string();
        assert!(matches!(
            config.session_config().unwrap_err(),
            ConfigValidationError::UnsupportedAlgorithm(_)
        ));

        config.algorithm = "HS512".to_string();
        assert_eq!(config.session_config().unwrap().algorithm(), Algorithm::HS512);
    }

    #[test]
    fn test_env_secret_missing_var() {
        let mut config = AuthConfig::default();
        config.jwt_secret = Some("env:EECS_TEST_SECRET_THAT_DOES_NOT_EXIST".to_string());
        assert_eq!(
            config.session_config().unwrap_err(),
            ConfigValidationError::EnvVarNotFound(
                "EECS_TEST_SECRET_THAT_DOES_NOT_EXIST".to_string()
            )
        );
    }

    #[test]
    fn test_custom_not_authenticated() {
        let mut config = config_with_secret();
        config.not_authenticated = Some(NotAuthenticatedConfig {
            status: 403,
            detail: "login required".to_string(),
        });
        let session = config.session_config().unwrap();
        assert_eq!(
            session.not_authenticated(),
            &NotAuthenticatedFault::Custom {
                status: StatusCode::FORBIDDEN,
                detail: "login required".to_string()
            }
        );

        config.not_authenticated = Some(NotAuthenticatedConfig {
            status: 42,
            detail: String::new(),
        });
        assert_eq!(
            config.session_config().unwrap_err(),
            ConfigValidationError::InvalidStatus(42)
        );
    }

    #[test]
    fn test_token_url_validation() {
        let mut config = config_with_secret();
        config.token_url = "auth/token".to_string();
        assert!(matches!(
            config.session_config().unwrap_err(),
            ConfigValidationError::InvalidTokenUrl(_)
        ));

        config.token_url = "/auth/logout".to_string();
        assert!(config.session_config().is_err());

        for route_syntax in ["/auth/{id}", "/auth/*rest", "/auth/{*rest}"] {
            config.token_url = route_syntax.to_string();
            assert_eq!(
                config.session_config().unwrap_err(),
                ConfigValidationError::InvalidTokenUrl(route_syntax.to_string())
            );
        }

        config.token_url = "/api/login".to_string();
        assert_eq!(config.session_config().unwrap().token_url(), "/api/login");
    }

    #[test]
    fn test_token_ttl_bounds() {
        let mut config = config_with_secret();
        for hours in [0, -1, MAX_TOKEN_TTL_HOURS + 1, 10_000_000_000, i64::MAX] {
            config.token_ttl_hours = hours;
            assert_eq!(
                config.session_config().unwrap_err(),
                ConfigValidationError::InvalidTokenTtl(hours)
            );
        }

        config.token_ttl_hours = MAX_TOKEN_TTL_HOURS;
        assert_eq!(
            config.session_config().unwrap().token_ttl(),
            Duration::days(365)
        );
    }

    #[test]
    fn test_bcrypt_cost_bounds() {
        let mut config = config_with_secret();
        config.bcrypt_cost = 3;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigValidationError::InvalidBcryptCost(3)
        );
        config.bcrypt_cost = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let session = config_with_secret().session_config().unwrap();
        let rendered = format!("{session:?}");
        assert!(!rendered.contains(SECRET));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_generate_jwt_secret() {
        let secret = AuthConfig::generate_jwt_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
