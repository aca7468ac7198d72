//! Request gate for protected handlers.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use super::{
    AuthError, CredentialStore, CredentialVerifier, Principal, SessionConfig, SessionResolver,
    TokenCodec, UserLookup,
};

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    config: Arc<SessionConfig>,
    codec: Arc<TokenCodec>,
    resolver: SessionResolver,
    verifier: CredentialVerifier,
}

impl AuthState {
    /// Wire the session pipeline to its user-store collaborators.
    pub fn new(
        config: SessionConfig,
        users: Arc<dyn UserLookup>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let config = Arc::new(config);
        let codec = Arc::new(TokenCodec::new(&config));
        let resolver = SessionResolver::new(config.clone(), codec.clone(), users);

        Self {
            config,
            codec,
            resolver,
            verifier: CredentialVerifier::new(credentials),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn resolver(&self) -> &SessionResolver {
        &self.resolver
    }

    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }
}

/// Authenticated user extracted from request.
///
/// Adding it to a handler's arguments makes the handler protected: the
/// session is resolved before the handler runs and any rejection is
/// returned to the client as-is.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

impl CurrentUser {
    pub fn username(&self) -> &str {
        &self.0.username
    }

    pub fn principal(&self) -> &Principal {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthState::from_ref(state);
        auth.resolver.resolve(&parts.headers).await.map(CurrentUser)
    }
}
