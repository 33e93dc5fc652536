use migration::{Migrator, MigratorTrait};
use oidc_email_provider::AppResources;
use oidc_email_provider::admission::AdmissionLog;
use oidc_email_provider::api::start_webserver;
use oidc_email_provider::config::load_config_or_panic;
use oidc_email_provider::keys::KeyManager;
use oidc_email_provider::mailer::SmtpMailer;
use oidc_email_provider::reaper::ExpiryReaper;
use oidc_email_provider::signer::Rs256Signer;
use oidc_email_provider::store::{DbStore, Store};
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "oidc_email_provider=info,tower_http=info,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    // -------- Tracing Initialization --------
    initialize_standard_tracing();

    // Load config
    let config = Arc::new(load_config_or_panic());
    if config.tokens.access_token_lifetime_secs != config.tokens.token_response_expires_in {
        tracing::warn!(
            stored = config.tokens.access_token_lifetime_secs,
            advertised = config.tokens.token_response_expires_in,
            "Access tokens expire at a different time than the token response advertises"
        );
    }

    // Set up SeaORM database connection
    let db = Arc::new(Database::connect(&config.database_url).await?);
    if config.run_migrations {
        Migrator::up(db.as_ref(), None).await?;
    }
    let store = Arc::new(DbStore::new(db));

    let keys = Arc::new(KeyManager::load_or_generate(store.as_ref()).await?);
    let mailer = Arc::new(SmtpMailer::new(&config.smtp)?);

    let resources = AppResources::new(
        store.clone() as Arc<dyn Store>,
        store as Arc<dyn AdmissionLog>,
        mailer,
        keys,
        Arc::new(Rs256Signer),
        config,
    );

    let reaper = ExpiryReaper::from_resources(&resources).spawn();
    let served = start_webserver(resources, shutdown_signal()).await;
    reaper.shutdown().await;
    served
}
