//! Token carriers: secure, script-inaccessible cookies scoped to the
//! whole origin, with a body-field fallback for the refresh token so
//! non-cookie clients can still use the refresh flow.

use axum_extra::extract::cookie::{Cookie, CookieJar};

use clipstream_types::api::RefreshRequest;

use crate::tokens::TokenPair;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

fn carrier(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .build()
}

/// Write both tokens as carriers (login and refresh responses).
pub fn set_session(jar: CookieJar, pair: &TokenPair) -> CookieJar {
    jar.add(carrier(ACCESS_COOKIE, pair.access_token.clone()))
        .add(carrier(REFRESH_COOKIE, pair.refresh_token.clone()))
}

/// Remove both carriers (logout).
pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

/// The long-lived token as presented by the client: carrier first, then
/// the structured body field.
pub fn presented_refresh_token(jar: &CookieJar, body: &RefreshRequest) -> Option<String> {
    jar.get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.refresh_token.clone())
}
