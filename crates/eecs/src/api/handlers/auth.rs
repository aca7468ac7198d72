//! Authentication handlers.

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderName, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::{info, instrument, warn};

use crate::api::state::AppState;
use crate::auth::{AuthError, CurrentUser, SessionConfig, Verification};

/// `code` value the admin frontend treats as success.
pub const SUCCESS_CODE: u32 = 20000;

/// Form-encoded login request.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub code: u32,
    pub auth_token: String,
    pub token_type: &'static str,
}

/// Body of responses that only report success.
#[derive(Debug, Serialize)]
pub struct CodeResponse {
    pub code: u32,
}

/// Profile of the current user.
#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    pub code: u32,
    pub roles: Vec<String>,
    pub name: String,
    pub avatar: String,
    pub introduction: String,
}

fn session_cookie(config: &SessionConfig, token: &str, max_age: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_name(),
        token,
        max_age
    )
}

/// `Set-Cookie` header to attach, if the cookie source is enabled.
fn cookie_header(
    config: &SessionConfig,
    token: &str,
    max_age: i64,
) -> Option<(HeaderName, String)> {
    config
        .sources()
        .cookie
        .then(|| (SET_COOKIE, session_cookie(config, token, max_age)))
}

/// Exchange a username and password for an access token.
#[instrument(skip(state, form), fields(username = %form.username))]
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, AuthError> {
    let principal = match state
        .auth
        .verifier()
        .authenticate(&form.username, &form.password)
        .await
    {
        Verification::Verified(principal) => principal,
        Verification::CredentialMismatch => {
            warn!("login rejected");
            return Err(AuthError::InvalidCredentials);
        }
        Verification::StoreUnavailable(e) => {
            return Err(AuthError::StoreUnavailable(e.to_string()));
        }
    };

    let config = state.auth.config();
    let ttl = config.token_ttl();
    let token = state
        .auth
        .codec()
        .issue(principal.identifier(), Map::new(), Some(ttl))?;

    if let Err(e) = state.users.record_login(principal.identifier()).await {
        warn!(error = %e, "failed to record last login");
    }
    info!("issued access token");

    Ok((
        AppendHeaders(cookie_header(config, &token, ttl.num_seconds())),
        Json(LoginResponse {
            code: SUCCESS_CODE,
            auth_token: token,
            token_type: "bearer",
        }),
    ))
}

/// Tokens are not tracked server-side; logging out only clears the cookie.
pub async fn logout(State(state): State<AppState>, user: CurrentUser) -> impl IntoResponse {
    info!(username = %user.username(), "logout");
    (
        AppendHeaders(cookie_header(state.auth.config(), "", 0)),
        Json(CodeResponse { code: SUCCESS_CODE }),
    )
}

/// Echo the authenticated username.
pub async fn protected_route(user: CurrentUser) -> Json<String> {
    Json(user.0.username)
}

pub async fn get_user_info(user: CurrentUser) -> Json<UserInfoResponse> {
    let principal = user.0;
    Json(UserInfoResponse {
        code: SUCCESS_CODE,
        roles: principal.roles,
        name: principal.username,
        avatar: String::new(),
        introduction: String::new(),
    })
}
