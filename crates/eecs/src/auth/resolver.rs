//! Per-request session resolution.
//!
//! A request moves through [`SessionState`] until it is either
//! `Authenticated` or `Rejected`:
//!
//! ```text
//! NoToken ──────────────────────────────────────────────► Rejected(NotAuthenticated)
//! TokenPresent ─decode─► Decoded ─lookup─► UserResolved ─► Authenticated
//!       │                   │                 (miss)
//!       └── bad token ──────┴── no subject ─────┴────────► Rejected(InvalidCredentials)
//! ```
//!
//! Malformed tokens and unknown users end in the same fault so the client
//! cannot tell which check failed.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use tracing::{debug, error, warn};

use super::{AuthError, Claims, Principal, SessionConfig, TokenCodec, extract_token};

/// User store lookup the resolver depends on.
#[async_trait]
pub trait UserLookup: Send + Sync {
    /// Find the principal for a token subject, `None` if no such user.
    async fn lookup_user(&self, identifier: &str) -> anyhow::Result<Option<Principal>>;
}

/// Resolution states.
#[derive(Debug)]
pub enum SessionState {
    NoToken,
    TokenPresent(String),
    Decoded(Claims),
    UserResolved(Principal),
    Authenticated(Principal),
    Rejected(AuthError),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Authenticated(_) | SessionState::Rejected(_)
        )
    }

    fn name(&self) -> &'static str {
        match self {
            SessionState::NoToken => "no_token",
            SessionState::TokenPresent(_) => "token_present",
            SessionState::Decoded(_) => "decoded",
            SessionState::UserResolved(_) => "user_resolved",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Rejected(_) => "rejected",
        }
    }
}

/// Turns a request into a [`Principal`] or a rejection.
#[derive(Clone)]
pub struct SessionResolver {
    config: Arc<SessionConfig>,
    codec: Arc<TokenCodec>,
    users: Arc<dyn UserLookup>,
}

impl SessionResolver {
    pub fn new(
        config: Arc<SessionConfig>,
        codec: Arc<TokenCodec>,
        users: Arc<dyn UserLookup>,
    ) -> Self {
        Self {
            config,
            codec,
            users,
        }
    }

    /// Initial state for a request.
    pub fn start(&self, headers: &HeaderMap) -> SessionState {
        match extract_token(headers, &self.config) {
            Some(token) => SessionState::TokenPresent(token),
            None => SessionState::NoToken,
        }
    }

    /// Perform one transition. Terminal states are returned unchanged.
    pub async fn advance(&self, state: SessionState) -> SessionState {
        match state {
            SessionState::NoToken => SessionState::Rejected(AuthError::NotAuthenticated(
                self.config.not_authenticated().clone(),
            )),
            SessionState::TokenPresent(token) => match self.codec.decode(&token) {
                Ok(claims) => SessionState::Decoded(claims),
                Err(e) => {
                    warn!(error = %e, "rejecting token");
                    SessionState::Rejected(e.into())
                }
            },
            SessionState::Decoded(claims) => {
                let Some(subject) = claims.sub else {
                    warn!("rejecting token without subject");
                    return SessionState::Rejected(AuthError::InvalidCredentials);
                };
                match self.users.lookup_user(&subject).await {
                    Ok(Some(principal)) => SessionState::UserResolved(principal),
                    Ok(None) => {
                        warn!(subject = %subject, "token subject has no matching user");
                        SessionState::Rejected(AuthError::InvalidCredentials)
                    }
                    Err(e) => {
                        error!(subject = %subject, error = %e, "user lookup failed");
                        SessionState::Rejected(AuthError::StoreUnavailable(e.to_string()))
                    }
                }
            }
            SessionState::UserResolved(principal) => SessionState::Authenticated(principal),
            terminal => terminal,
        }
    }

    /// Run resolution to completion.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let mut state = self.start(headers);
        loop {
            debug!(state = state.name(), "session resolution");
            state = match state {
                SessionState::Authenticated(principal) => return Ok(principal),
                SessionState::Rejected(err) => return Err(err),
                pending => self.advance(pending).await,
            };
        }
    }
}
