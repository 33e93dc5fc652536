//! Passwordless sign-in: email entry, code entry, session cookie and logout.
//!
//! Every page carries the `request_id` of the authorization request it was reached from,
//! so a finished sign-in lands back on the identity chooser for that request.

use crate::AppResources;
use crate::entity::{authorization_request, identity};
use crate::error::{ErrorResponse, ProviderError};
use crate::oauth2::session::{Requester, clear_login_cookie, login_cookie, login_key};
use crate::oauth2::{OAUTH2_TAG, required};
use crate::secrets::{generate_token, hash_secret};
use askama::Template;
use axum::{
    Form,
    extract::State,
    http::{HeaderMap, header::SET_COOKIE},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct LoginEmailForm {
    pub request_id: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct EmailCodeForm {
    pub request_id: String,
    pub email: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CompleteEmailLoginForm {
    pub request_id: String,
    pub email_request_id: String,
    pub code: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct LogoutForm {
    /// Local path to return to
    pub prev_page: String,
}

#[derive(Template)]
#[template(path = "login_email.html")]
struct LoginEmailTemplate<'a> {
    request_id: &'a str,
}

#[derive(Template)]
#[template(path = "email_code.html")]
struct EmailCodeTemplate<'a> {
    email: &'a str,
    validity_minutes: i64,
    request_id: &'a str,
    email_request_id: &'a str,
}

async fn load_request(
    resources: &AppResources,
    request_id: &str,
) -> Result<authorization_request::Model, ProviderError> {
    resources
        .store
        .get_authorization_request(request_id)
        .await?
        .ok_or_else(|| ProviderError::NotFound("Unknown authorization request".into()))
}

/// Email entry page.
#[tracing::instrument(skip(resources))]
#[utoipa::path(
    post,
    path = "/login-email",
    tag = OAUTH2_TAG,
    operation_id = "Email Login Start",
    summary = "Ask for the email address to sign in with",
    request_body(
        content = LoginEmailForm,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 200, description = "Email entry page", body = String, content_type = "text/html"),
        (status = 400, description = "Missing request_id", body = ErrorResponse),
        (status = 404, description = "Unknown authorization request", body = ErrorResponse),
    )
)]
pub async fn login_email(
    State(resources): State<AppResources>,
    Form(form): Form<LoginEmailForm>,
) -> Result<Html<String>, ProviderError> {
    let request_id = required(&form.request_id, "request_id")?;
    let request = load_request(&resources, request_id).await?;
    let page = LoginEmailTemplate {
        request_id: &request.id,
    }
    .render()?;
    Ok(Html(page))
}

/// Mail a one-time code and show the code entry page.
#[tracing::instrument(skip(resources, requester, form))]
#[utoipa::path(
    post,
    path = "/email-code",
    tag = OAUTH2_TAG,
    operation_id = "Email Login Send Code",
    summary = "Send a one-time code to an email address",
    description = "Verification emails are rate limited per requester.",
    request_body(
        content = EmailCodeForm,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 200, description = "Code entry page", body = String, content_type = "text/html"),
        (status = 400, description = "Missing fields or invalid email address", body = ErrorResponse),
        (status = 404, description = "Unknown authorization request", body = ErrorResponse),
        (status = 429, description = "Too many verification emails requested", body = ErrorResponse),
        (status = 500, description = "The email could not be delivered", body = ErrorResponse),
    )
)]
pub async fn email_code(
    State(resources): State<AppResources>,
    requester: Requester,
    Form(form): Form<EmailCodeForm>,
) -> Result<Html<String>, ProviderError> {
    let request_id = required(&form.request_id, "request_id")?;
    let email = required(&form.email, "email")?;
    let request = load_request(&resources, request_id).await?;

    let email_request_id = resources
        .email
        .start_email_validation(&requester.0, email)
        .await?;

    let page = EmailCodeTemplate {
        email: &email.to_lowercase(),
        validity_minutes: resources.email.code_validity().whole_minutes().max(1),
        request_id: &request.id,
        email_request_id: &email_request_id,
    }
    .render()?;
    Ok(Html(page))
}

/// Check the code, sign the browser in and return to the identity chooser.
#[tracing::instrument(skip(resources, headers, form))]
#[utoipa::path(
    post,
    path = "/complete-email-login",
    tag = OAUTH2_TAG,
    operation_id = "Email Login Complete",
    summary = "Finish signing in with a one-time code",
    description = "Links the verified email identity to the browser session, creating the session \
                   (and its `login_key` cookie) when the browser has none, then redirects back to the \
                   authorization request.",
    request_body(
        content = CompleteEmailLoginForm,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 303, description = "Back to the authorization endpoint"),
        (status = 400, description = "Missing fields, wrong or expired code", body = ErrorResponse),
        (status = 404, description = "Unknown authorization request", body = ErrorResponse),
    )
)]
pub async fn complete_email_login(
    State(resources): State<AppResources>,
    headers: HeaderMap,
    Form(form): Form<CompleteEmailLoginForm>,
) -> Result<Response, ProviderError> {
    let request_id = required(&form.request_id, "request_id")?;
    let request = load_request(&resources, request_id).await?;
    let email_request_id = required(&form.email_request_id, "email_request_id")?;
    let code = required(&form.code, "code")?;

    let email = resources
        .email
        .complete_email_validation(email_request_id, code)
        .await?;

    let mut live_session = None;
    if let Some(hash) = login_key(&headers).map(|k| hash_secret(&k)) {
        if resources.store.login_session_exists(&hash).await? {
            live_session = Some(hash);
        }
    }
    let mut new_cookie = None;
    let login_key_hash = match live_session {
        Some(hash) => hash,
        None => {
            let key = generate_token()?;
            let hash = hash_secret(&key);
            resources.store.create_login_session(&hash).await?;
            new_cookie = Some(login_cookie(&key)?);
            hash
        }
    };

    let identity = resources
        .store
        .ensure_identity(&email, identity::EMAIL_PROVIDER, &email)
        .await?;
    resources
        .store
        .ensure_login_mapping(&login_key_hash, &identity.id)
        .await?;
    tracing::info!(
        identity_id = %identity.id,
        new_session = new_cookie.is_some(),
        "Email sign-in completed"
    );

    let target = format!("{}?{}", resources.config.endpoint("/auth"), request.raw_query);
    let mut response = Redirect::to(&target).into_response();
    if let Some(cookie) = new_cookie {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    Ok(response)
}

/// End the browser session and forget every identity linked to it.
#[tracing::instrument(skip(resources, headers))]
#[utoipa::path(
    post,
    path = "/logout",
    tag = OAUTH2_TAG,
    operation_id = "Logout",
    summary = "Sign the browser out",
    request_body(
        content = LogoutForm,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 303, description = "Back to `prev_page`, or `/` for anything but a local path"),
    )
)]
pub async fn logout(
    State(resources): State<AppResources>,
    headers: HeaderMap,
    Form(form): Form<LogoutForm>,
) -> Result<Response, ProviderError> {
    if let Some(key) = login_key(&headers) {
        resources
            .store
            .delete_login_session(&hash_secret(&key))
            .await?;
        tracing::info!("Login session ended");
    }

    let target = if is_local_path(&form.prev_page) {
        form.prev_page.as_str()
    } else {
        "/"
    };
    let mut response = Redirect::to(target).into_response();
    response
        .headers_mut()
        .insert(SET_COOKIE, clear_login_cookie());
    Ok(response)
}

/// A path on this host: `/x` but not the protocol-relative `//host/x` or `/\host`.
fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_local_paths_are_followed() {
        assert!(is_local_path("/auth?client_id=x"));
        assert!(is_local_path("/"));
        assert!(!is_local_path("//evil.example/"));
        assert!(!is_local_path("/\\evil.example"));
        assert!(!is_local_path("https://evil.example/"));
        assert!(!is_local_path(""));
    }
}
