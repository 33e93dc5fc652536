//! Landing page.

use crate::AppResources;
use crate::api::health::MISC_TAG;
use crate::error::ProviderError;
use askama::Template;
use axum::{extract::State, response::Html};

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    discovery_url: String,
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/",
    tag = MISC_TAG,
    operation_id = "Index",
    summary = "Landing page pointing at the discovery document",
    responses(
        (status = 200, description = "Landing page", body = String, content_type = "text/html")
    )
)]
pub async fn index(State(resources): State<AppResources>) -> Result<Html<String>, ProviderError> {
    let page = IndexTemplate {
        discovery_url: resources
            .config
            .endpoint("/.well-known/openid-configuration"),
    }
    .render()?;
    Ok(Html(page))
}
