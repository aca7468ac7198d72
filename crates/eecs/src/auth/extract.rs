//! Locating the access token in a request.
//!
//! Only presence and envelope format are checked here; the token contents
//! are left to the codec.

use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE},
};

use super::SessionConfig;

/// Pull the raw token out of the request.
///
/// The cookie is tried first when enabled, then the `Authorization` header.
pub fn extract_token(headers: &HeaderMap, config: &SessionConfig) -> Option<String> {
    let sources = config.sources();

    if sources.cookie {
        let token = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|cookie_header| token_from_cookie_header(cookie_header, config.cookie_name()));
        if let Some(token) = token {
            return Some(token.to_string());
        }
    }

    if sources.header {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token_from_header);
        if let Some(token) = token {
            return Some(token.to_string());
        }
    }

    None
}

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Option<&str> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next()?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    Some(token)
}

fn token_from_cookie_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        let value = value.trim().trim_matches('"');
        if name.trim() == cookie_name && !value.is_empty() {
            Some(value)
        } else {
            None
        }
    })
}
