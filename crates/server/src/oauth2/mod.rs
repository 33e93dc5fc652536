//! OpenID Connect authorization server.
//!
//! ## Endpoints
//!
//! - `GET /.well-known/openid-configuration` - Discovery document
//! - `GET /jwks` - Public signing keys
//! - `GET /auth` - Authorization endpoint, renders the identity chooser
//! - `POST /approve` - Issue an authorization code for a chosen identity
//! - `POST /token` - Redeem an authorization code
//! - `GET /userinfo` - Resolve a bearer token
//! - `POST /login-email`, `/email-code`, `/complete-email-login` - Email code login
//! - `POST /logout` - End the browser session

pub mod approve;
pub mod authorize;
mod claims;
pub mod discovery;
pub mod login;
pub mod session;
pub mod token;

pub use claims::IdTokenClaims;

use crate::AppResources;
use crate::error::ProviderError;
use axum::response::{IntoResponse, Redirect, Response};
use utoipa_axum::{router::OpenApiRouter, routes};

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";

/// Creates the OAuth2 router. State is attached by the caller.
pub fn router() -> OpenApiRouter<AppResources> {
    OpenApiRouter::new()
        .routes(routes!(discovery::openid_configuration))
        .routes(routes!(discovery::jwks))
        .routes(routes!(authorize::authorize))
        .routes(routes!(approve::approve))
        .routes(routes!(token::token))
        .routes(routes!(token::userinfo))
        .routes(routes!(login::login_email))
        .routes(routes!(login::email_code))
        .routes(routes!(login::complete_email_login))
        .routes(routes!(login::logout))
}

/// 303 to `target` with `params` appended to whatever query it already has.
pub(crate) fn redirect_with_params(
    target: &str,
    params: &[(&str, Option<&str>)],
) -> Result<Response, ProviderError> {
    let mut url = url::Url::parse(target)
        .map_err(|_| ProviderError::ClientInput("redirect_uri is not a valid URL".into()))?;
    {
        let mut query = url.query_pairs_mut();
        for (name, value) in params {
            if let Some(value) = value {
                query.append_pair(name, value);
            }
        }
    }
    Ok(Redirect::to(url.as_str()).into_response())
}

/// Report an authorization error back to the client, as RFC 6749 section 4.1.2.1 asks.
pub(crate) fn error_redirect(
    redirect_uri: &str,
    state: Option<&str>,
    error: &str,
) -> Result<Response, ProviderError> {
    redirect_with_params(redirect_uri, &[("error", Some(error)), ("state", state)])
}

/// Empty form fields count as missing.
pub(crate) fn required<'a>(value: &'a str, name: &str) -> Result<&'a str, ProviderError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ProviderError::ClientInput(format!("{name} is required")));
    }
    Ok(value)
}
