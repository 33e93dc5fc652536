//! Token and UserInfo endpoints.

use crate::AppResources;
use crate::entity::access_token;
use crate::error::{ErrorResponse, ProviderError};
use crate::oauth2::{IdTokenClaims, OAUTH2_TAG, required};
use crate::secrets::{generate_token, hash_secret};
use crate::signer::SignError;
use crate::store::StoreError;
use axum::{
    Form, Json,
    extract::State,
    http::{
        HeaderMap,
        header::{AUTHORIZATION, CACHE_CONTROL, PRAGMA},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct TokenRequest {
    /// Only `authorization_code` is supported; may be omitted
    pub grant_type: Option<String>,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Compact RS256 JWS
    pub id_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfoResponse {
    pub sub: String,
    pub email: String,
}

/// OAuth2 Token endpoint.
#[tracing::instrument(skip(resources, params))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Redeem an authorization code",
    description = "Exchanges a single-use authorization code for an opaque bearer access token and a \
                   signed ID token.\n\n\
                   **Replay protection:** presenting a code that was already redeemed revokes the access \
                   token issued for it and fails with `invalid_grant`.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Missing, unknown, expired or replayed code", body = ErrorResponse),
    )
)]
pub async fn token(
    State(resources): State<AppResources>,
    Form(params): Form<TokenRequest>,
) -> Result<Response, ProviderError> {
    match params.grant_type.as_deref() {
        Some(grant_type) if grant_type != "authorization_code" => {
            return Err(ProviderError::ClientInput(format!(
                "Unsupported grant_type '{grant_type}'"
            )));
        }
        _ => {}
    }
    let code = required(&params.code, "code")?;

    let Some(pending) = resources.store.take_pending_code(code).await? else {
        // Absent is either "never issued" or "already redeemed"; issued tokens tell them apart.
        if let Some(issued) = resources.store.find_access_token_by_code(code).await? {
            resources
                .store
                .delete_access_token(&issued.token_hash)
                .await?;
            tracing::warn!(
                name = "token.code_replay",
                identity_id = %issued.identity_id,
                "Authorization code presented twice, revoked the access token issued for it"
            );
            return Err(ProviderError::SecurityViolation(
                "Attempt to use authorization code multiple times. The access token issued \
                 for it has been revoked."
                    .into(),
            ));
        }
        return Err(ProviderError::InvalidGrant(
            "Unknown authorization code".into(),
        ));
    };

    let code_lifetime = time::Duration::seconds(resources.config.tokens.id_token_lifetime_secs);
    if pending.is_older_than(code_lifetime, OffsetDateTime::now_utc()) {
        return Err(ProviderError::InvalidGrant(
            "Authorization code expired".into(),
        ));
    }

    let claims: IdTokenClaims = serde_json::from_str(&pending.claims)?;
    let key = resources.keys.active().ok_or(SignError::NoActiveKey)?;
    let id_token = resources.signer.sign(&claims, key)?;

    let access_token = generate_token()?;
    resources
        .store
        .insert_access_token(access_token::Model {
            token_hash: hash_secret(&access_token),
            identity_id: claims.sub.clone(),
            issued_at: OffsetDateTime::now_utc(),
            lifetime_secs: resources.config.tokens.access_token_lifetime_secs,
            authorization_code: pending.code,
        })
        .await?;
    tracing::info!(identity_id = %claims.sub, kid = %key.kid(), "Issued tokens");

    Ok((
        [(CACHE_CONTROL, "no-store"), (PRAGMA, "no-cache")],
        Json(TokenResponse {
            access_token,
            id_token,
            token_type: "bearer".to_string(),
            expires_in: resources.config.tokens.token_response_expires_in,
        }),
    )
        .into_response())
}

/// OpenID Connect UserInfo endpoint.
#[tracing::instrument(skip(resources, headers))]
#[utoipa::path(
    get,
    path = "/userinfo",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect UserInfo",
    summary = "Resolve a bearer token to its identity",
    description = "**Authentication:** Include the access token as a Bearer token in the Authorization header. \
                   Expired tokens are deleted on sight.",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Identity claims", body = UserInfoResponse),
        (status = 401, description = "Missing, invalid or expired access token", body = ErrorResponse),
    )
)]
pub async fn userinfo(
    State(resources): State<AppResources>,
    headers: HeaderMap,
) -> Result<Json<UserInfoResponse>, ProviderError> {
    let presented = bearer_token(&headers).ok_or_else(|| {
        ProviderError::Unauthorized("Missing or invalid Authorization header".into())
    })?;
    let token_hash = hash_secret(presented);

    let token = resources
        .store
        .get_access_token(&token_hash)
        .await?
        .ok_or_else(|| ProviderError::Unauthorized("Invalid access token".into()))?;
    if token.is_expired() {
        resources.store.delete_access_token(&token_hash).await?;
        return Err(ProviderError::Unauthorized("Token expired".into()));
    }

    let identity = resources
        .store
        .get_identity(&token.identity_id)
        .await?
        .ok_or_else(|| {
            StoreError::Malformed(format!(
                "access token refers to missing identity {}",
                token.identity_id
            ))
        })?;

    Ok(Json(UserInfoResponse {
        sub: identity.id,
        email: identity.email,
    }))
}

/// `Authorization: Bearer <token>`, scheme case-insensitive, nothing else.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    let (scheme, token) = (parts.next()?, parts.next()?);
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}
