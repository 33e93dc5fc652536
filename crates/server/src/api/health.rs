//! Liveness endpoint for the provider.

/// Tag for endpoints that are not part of the OpenID Connect surface.
pub const MISC_TAG: &str = "Miscellaneous";

/// Report that the provider process is up.
///
/// Does not touch the database or the SMTP relay.
#[tracing::instrument()]
#[utoipa::path(
    method(get, head),
    path = "/healthz",
    tag = MISC_TAG,
    operation_id = "Liveness",
    summary = "Provider liveness",
    description = "Answers `ok` while the provider is serving requests. Neither the database \
                   nor the mail relay is contacted, so a failing SMTP server never marks the \
                   provider unhealthy. Accepts GET and HEAD.",
    responses(
        (status = 200, description = "Provider is serving", body = str, content_type = "text/plain", example = "ok")
    )
)]
pub async fn health() -> &'static str {
    "ok"
}
