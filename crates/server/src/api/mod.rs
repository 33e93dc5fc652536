//! HTTP surface of the provider.
//!
//! - `oauth2` endpoints (discovery, authorization, sign-in, tokens) from [`crate::oauth2`]
//! - `health` - Health check endpoint (/healthz)
//! - `index` - Landing page (/)
//! - `openapi` - OpenAPI/Utoipa configuration, served as ReDoc at /api-docs

pub mod health;
pub mod index;
pub mod openapi;

pub use health::MISC_TAG;

use crate::AppResources;
use crate::oauth2;
use axum::{
    Router,
    http::{
        HeaderValue,
        header::{CONTENT_SECURITY_POLICY, REFERRER_POLICY},
    },
};
use std::net::SocketAddr;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Pages must not be framed and never run scripts.
const CONTENT_SECURITY_POLICY_VALUE: &str = "frame-ancestors 'none'; script-src 'none'";

/// Builds the complete application router.
pub fn app(resources: AppResources) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .merge(oauth2::router())
        .routes(routes!(health::health))
        .routes(routes!(index::index))
        .with_state(resources)
        .split_for_parts();

    router
        .merge(Redoc::with_url("/api-docs", api))
        .layer(SetResponseHeaderLayer::overriding(
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY_VALUE),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Serves the application until `shutdown` resolves.
#[tracing::instrument(skip(resources, shutdown))]
pub async fn start_webserver(
    resources: AppResources,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> color_eyre::Result<()> {
    let addr = resources.config.listen_addr.clone();
    let router = app(resources);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
