//! Authorization endpoint.

use crate::AppResources;
use crate::entity::{authorization_request, identity};
use crate::error::{ErrorResponse, ProviderError};
use crate::oauth2::session::login_key;
use crate::oauth2::{OAUTH2_TAG, error_redirect};
use crate::secrets::{generate_token, hash_secret};
use askama::Template;
use axum::{
    extract::{Query, RawQuery, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use time::OffsetDateTime;
use utoipa::IntoParams;

/// OAuth2 authorization request parameters.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeParams {
    /// Relying party identifier; must be an absolute URL
    pub client_id: Option<String>,
    /// Must start with `client_id`
    pub redirect_uri: Option<String>,
    /// Must be `code`
    pub response_type: Option<String>,
    /// Opaque value returned unchanged to the client
    pub state: Option<String>,
    pub scope: Option<String>,
    /// Copied into the ID token
    pub nonce: Option<String>,
    /// `none` forbids any interaction
    pub prompt: Option<String>,
}

#[derive(Debug)]
struct IdentityView {
    id: String,
    email: String,
}

impl From<identity::Model> for IdentityView {
    fn from(identity: identity::Model) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
        }
    }
}

/// Identity chooser shown for every fresh authorization request.
#[derive(Template)]
#[template(path = "chooser.html")]
struct ChooserTemplate {
    client_host: String,
    request_id: String,
    identities: Vec<IdentityView>,
    /// Where logging out should land: this very request again.
    prev_page: String,
}

/// OAuth2 Authorization endpoint.
#[tracing::instrument(skip(resources, headers, raw_query))]
#[utoipa::path(
    get,
    path = "/auth",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Start an authorization code flow",
    description = "Validates the client parameters, stores the request and renders a page listing the \
                   identities already signed in through this browser, with the option to sign in with \
                   another email address.\n\n\
                   `prompt=none` and a missing or unsupported `response_type` are reported back to the \
                   client through its `redirect_uri`.",
    params(AuthorizeParams),
    responses(
        (status = 200, description = "Identity chooser page", body = String, content_type = "text/html"),
        (status = 303, description = "Error redirect back to the client"),
        (status = 400, description = "Invalid client_id or redirect_uri", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(resources): State<AppResources>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<AuthorizeParams>,
) -> Result<Response, ProviderError> {
    let client_id = params
        .client_id
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ProviderError::ClientInput("client_id is required".into()))?;
    let client_url = url::Url::parse(client_id)
        .map_err(|_| ProviderError::ClientInput("client_id must be an absolute URL".into()))?;

    let redirect_uri = params
        .redirect_uri
        .as_deref()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ProviderError::ClientInput("redirect_uri is required".into()))?;
    // Coarse same-origin check: no client registry, the redirect must live below the client id.
    if !redirect_uri.starts_with(client_id) {
        return Err(ProviderError::ClientInput(
            "redirect_uri must start with client_id".into(),
        ));
    }

    let state = params.state.as_deref();
    if params
        .prompt
        .as_deref()
        .is_some_and(|p| p.split_whitespace().any(|v| v == "none"))
    {
        return error_redirect(redirect_uri, state, "interaction_required");
    }
    if params.response_type.as_deref() != Some("code") {
        return error_redirect(redirect_uri, state, "unsupported_response_type");
    }

    let login_key_hash = login_key(&headers).map(|k| hash_secret(&k));
    let identities = match &login_key_hash {
        Some(hash) => resources.store.identities_for_login_key(hash).await?,
        None => Vec::new(),
    };

    let raw_query = raw_query.unwrap_or_default();
    let request = authorization_request::Model {
        id: generate_token()?,
        login_key_hash,
        raw_query: raw_query.clone(),
        client_id: client_id.to_string(),
        redirect_uri: redirect_uri.to_string(),
        state: params.state.clone(),
        scope: params.scope.clone(),
        nonce: params.nonce.clone(),
        created_at: OffsetDateTime::now_utc(),
    };
    let request_id = request.id.clone();
    resources.store.insert_authorization_request(request).await?;
    tracing::debug!(
        client_id,
        known_identities = identities.len(),
        "Stored authorization request"
    );

    let page = ChooserTemplate {
        client_host: client_url.host_str().unwrap_or(client_id).to_string(),
        request_id,
        identities: identities.into_iter().map(IdentityView::from).collect(),
        prev_page: format!("/auth?{raw_query}"),
    }
    .render()?;
    Ok(Html(page).into_response())
}
