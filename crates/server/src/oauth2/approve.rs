//! Approval: a signed-in session picks one of its identities for a pending request.

use crate::AppResources;
use crate::entity::pending_code;
use crate::error::{ErrorResponse, ProviderError};
use crate::oauth2::session::login_key;
use crate::oauth2::{IdTokenClaims, OAUTH2_TAG, redirect_with_params, required};
use crate::secrets::{generate_token, hash_secret};
use axum::{Form, extract::State, http::HeaderMap, response::Response};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ApproveForm {
    pub request_id: String,
    pub identity_id: String,
}

/// Issue an authorization code for the chosen identity.
///
/// The ID token claims are fixed here but only signed when the code is redeemed.
#[tracing::instrument(skip(resources, headers))]
#[utoipa::path(
    post,
    path = "/approve",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Approve",
    summary = "Approve an authorization request",
    description = "Requires the `login_key` session cookie. The authorization request must have been \
                   started by the same session and the session must have signed in as the chosen \
                   identity. Redirects to the client's `redirect_uri` with `code`, `state` and `scope`.",
    request_body(
        content = ApproveForm,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 303, description = "Redirect to the client with an authorization code"),
        (status = 401, description = "No session cookie", body = ErrorResponse),
        (status = 403, description = "Request or identity does not belong to this session", body = ErrorResponse),
        (status = 404, description = "Unknown request or identity", body = ErrorResponse),
    )
)]
pub async fn approve(
    State(resources): State<AppResources>,
    headers: HeaderMap,
    Form(form): Form<ApproveForm>,
) -> Result<Response, ProviderError> {
    let login_key = login_key(&headers).ok_or_else(|| {
        ProviderError::Unauthorized("Only logged-in users can access this endpoint".into())
    })?;
    let login_key_hash = hash_secret(&login_key);
    let request_id = required(&form.request_id, "request_id")?;
    let identity_id = required(&form.identity_id, "identity_id")?;

    let request = resources
        .store
        .get_authorization_request(request_id)
        .await?
        .ok_or_else(|| ProviderError::NotFound("Unknown authorization request".into()))?;
    if !request.is_owned_by(&login_key_hash) {
        return Err(ProviderError::Forbidden("Not your request".into()));
    }

    let identity = resources
        .store
        .get_identity(identity_id)
        .await?
        .ok_or_else(|| ProviderError::NotFound("Unknown identity".into()))?;
    if !resources
        .store
        .login_mapping_exists(&login_key_hash, &identity.id)
        .await?
    {
        tracing::warn!(
            identity_id = %identity.id,
            "Session tried to approve an identity it never signed in as"
        );
        return Err(ProviderError::Forbidden(
            "You don't have permissions for this identity".into(),
        ));
    }

    let now = OffsetDateTime::now_utc();
    let claims = IdTokenClaims::for_identity(
        &identity,
        &resources.config.root_uri,
        &request.client_id,
        request.nonce.as_deref(),
        now,
        Duration::seconds(resources.config.tokens.id_token_lifetime_secs),
    );
    let code = generate_token()?;
    resources
        .store
        .insert_pending_code(pending_code::Model {
            code: code.clone(),
            claims: serde_json::to_string(&claims)?,
            created_at: now,
        })
        .await?;

    if resources.config.tokens.single_use_authorization_requests {
        resources
            .store
            .delete_authorization_request(&request.id)
            .await?;
    }

    tracing::info!(
        client_id = %request.client_id,
        identity_id = %identity.id,
        "Authorization request approved"
    );
    redirect_with_params(
        &request.redirect_uri,
        &[
            ("code", Some(code.as_str())),
            ("state", request.state.as_deref()),
            ("scope", request.scope.as_deref()),
        ],
    )
}
