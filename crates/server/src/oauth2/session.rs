//! The `login_key` browser session and requester identification.
//!
//! The cookie carries the raw session secret; the server only ever sees its hash.

use crate::AppResources;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
    request::Parts,
};
use std::convert::Infallible;
use std::net::SocketAddr;

pub const LOGIN_COOKIE_NAME: &str = "login_key";
const LOGIN_COOKIE_MAX_AGE: u64 = 365 * 24 * 60 * 60;

/// The raw login key presented by the browser, if any.
pub fn login_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == LOGIN_COOKIE_NAME && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value handing a new login key to the browser for a year.
pub fn login_cookie(login_key: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{LOGIN_COOKIE_NAME}={login_key}; Path=/; Max-Age={LOGIN_COOKIE_MAX_AGE}; Secure; HttpOnly; SameSite=Lax"
    ))
}

pub fn clear_login_cookie() -> HeaderValue {
    HeaderValue::from_static("login_key=; Path=/; Max-Age=0; Secure; HttpOnly; SameSite=Lax")
}

/// Who is asking, for admission control. The peer IP, or the first
/// `X-Forwarded-For` hop when running behind a proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester(pub String);

impl FromRequestParts<AppResources> for Requester {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        resources: &AppResources,
    ) -> Result<Self, Self::Rejection> {
        if resources.config.behind_proxy {
            let forwarded = parts
                .headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(ip) = forwarded {
                return Ok(Requester(ip.to_string()));
            }
        }
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(Requester(peer.unwrap_or_else(|| "unknown".to_string())))
    }
}
