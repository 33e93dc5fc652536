//! Provider metadata and public keys. Both are fetched cross-origin by browser clients.

use crate::AppResources;
use crate::keys::Jwks;
use crate::oauth2::OAUTH2_TAG;
use axum::{
    Json,
    extract::State,
    http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

/// OpenID Connect Discovery document.
#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect Discovery",
    summary = "OpenID Connect Discovery document",
    description = "Endpoint URLs and capabilities of the provider. Clients should use this endpoint to \
                   discover the provider dynamically.",
    responses(
        (status = 200, description = "OpenID Connect configuration document", body = OpenIdConfiguration),
    )
)]
pub async fn openid_configuration(State(resources): State<AppResources>) -> impl IntoResponse {
    let config = &resources.config;
    let document = OpenIdConfiguration {
        issuer: config.root_uri.clone(),
        authorization_endpoint: config.endpoint("/auth"),
        token_endpoint: config.endpoint("/token"),
        userinfo_endpoint: config.endpoint("/userinfo"),
        jwks_uri: config.endpoint("/jwks"),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: vec!["authorization_code".to_string()],
        subject_types_supported: vec!["public".to_string()],
        id_token_signing_alg_values_supported: vec!["RS256".to_string()],
        scopes_supported: vec!["openid".to_string(), "email".to_string()],
        claims_supported: ["iss", "sub", "aud", "exp", "iat", "nonce", "email", "email_verified"]
            .into_iter()
            .map(String::from)
            .collect(),
    };
    ([(ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Json(document))
}

/// Public half of every signing key.
#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/jwks",
    tag = OAUTH2_TAG,
    operation_id = "JSON Web Key Set",
    summary = "Public keys for ID token verification",
    responses(
        (status = 200, description = "JWK set", body = Jwks),
    )
)]
pub async fn jwks(State(resources): State<AppResources>) -> impl IntoResponse {
    (
        [(ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(resources.keys.public_jwks()),
    )
}
