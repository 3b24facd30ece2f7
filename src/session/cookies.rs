use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};

use crate::config::CookieConfig;

pub const REFRESH_COOKIE: &str = "refresh_token";
pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf";
/// The refresh cookie is only sent to the session endpoints.
pub const REFRESH_COOKIE_PATH: &str = "/auth";
// Readable by the browser app, which echoes it back in `X-CSRF`.
const CSRF_COOKIE_PATH: &str = "/";

pub fn refresh_cookie(
    cfg: &CookieConfig,
    token: &str,
    max_age: u64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build(cfg, REFRESH_COOKIE, token, REFRESH_COOKIE_PATH, true, max_age)
}

pub fn csrf_cookie(
    cfg: &CookieConfig,
    token: &str,
    max_age: u64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build(cfg, CSRF_COOKIE, token, CSRF_COOKIE_PATH, false, max_age)
}

/// Expired copies of both session cookies.
pub fn cleared_cookies(cfg: &CookieConfig) -> Result<[HeaderValue; 2], InvalidHeaderValue> {
    Ok([
        build(cfg, REFRESH_COOKIE, "", REFRESH_COOKIE_PATH, true, 0)?,
        build(cfg, CSRF_COOKIE, "", CSRF_COOKIE_PATH, false, 0)?,
    ])
}

fn build(
    cfg: &CookieConfig,
    name: &str,
    value: &str,
    path: &str,
    http_only: bool,
    max_age: u64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{name}={value}; Path={path}; SameSite={}; Max-Age={max_age}",
        cfg.same_site.as_str()
    );
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if cfg.secure {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = cfg.domain.as_deref() {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    HeaderValue::from_str(&cookie)
}

/// First non-empty value of the named cookie across every `Cookie` header.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| key.trim() == name && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}

pub fn read_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
