//! Background purge of expired access tokens, stale email verification requests,
//! unredeemed authorization codes and abandoned authorization requests.

use crate::AppResources;
use crate::config::AppConfig;
use crate::store::Store;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub tokens_removed: u64,
    pub email_requests_removed: u64,
    pub pending_codes_removed: u64,
    pub authorization_requests_removed: u64,
    /// Records that could not be read or deleted; retried on the next sweep.
    pub failures: u64,
}

/// How often to sweep and how old each kind of record may get.
#[derive(Debug, Clone, Copy)]
pub struct ReaperSettings {
    pub interval: std::time::Duration,
    pub code_validity: Duration,
    pub pending_code_lifetime: Duration,
    pub authorization_request_lifetime: Duration,
}

impl ReaperSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            interval: std::time::Duration::from_secs(config.tokens.reaper_interval_secs),
            code_validity: Duration::seconds(config.email_verification.code_validity_secs),
            pending_code_lifetime: Duration::seconds(config.tokens.id_token_lifetime_secs),
            authorization_request_lifetime: Duration::seconds(
                config.tokens.authorization_request_lifetime_secs,
            ),
        }
    }
}

pub struct ExpiryReaper {
    store: Arc<dyn Store>,
    settings: ReaperSettings,
}

impl ExpiryReaper {
    pub fn new(store: Arc<dyn Store>, settings: ReaperSettings) -> Self {
        Self { store, settings }
    }

    pub fn from_resources(resources: &AppResources) -> Self {
        Self::new(
            resources.store.clone(),
            ReaperSettings::from_config(&resources.config),
        )
    }

    /// Delete every expired access token, then every email request, pending code and
    /// authorization request older than its lifetime.
    ///
    /// Tokens are re-read one by one, so a failure on one record never aborts the sweep.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let hashes = match self.store.access_token_hashes().await {
            Ok(hashes) => hashes,
            Err(e) => {
                tracing::warn!(name = "reaper.list_tokens", error = %e, "Failed to list access tokens");
                report.failures += 1;
                Vec::new()
            }
        };

        let now = OffsetDateTime::now_utc();
        for hash in hashes {
            let token = match self.store.get_access_token(&hash).await {
                Ok(Some(token)) => token,
                // Redeemed or revoked since the listing.
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(name = "reaper.read_token", error = %e, "Failed to read access token");
                    report.failures += 1;
                    continue;
                }
            };
            if !token.is_expired_at(now) {
                continue;
            }
            match self.store.delete_access_token(&hash).await {
                Ok(true) => report.tokens_removed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(name = "reaper.delete_token", error = %e, "Failed to delete access token");
                    report.failures += 1;
                }
            }
        }

        match self
            .store
            .delete_email_requests_before(now - self.settings.code_validity)
            .await
        {
            Ok(removed) => report.email_requests_removed = removed,
            Err(e) => {
                tracing::warn!(name = "reaper.email_requests", error = %e, "Failed to purge email requests");
                report.failures += 1;
            }
        }

        match self
            .store
            .delete_pending_codes_before(now - self.settings.pending_code_lifetime)
            .await
        {
            Ok(removed) => report.pending_codes_removed = removed,
            Err(e) => {
                tracing::warn!(name = "reaper.pending_codes", error = %e, "Failed to purge pending codes");
                report.failures += 1;
            }
        }

        match self
            .store
            .delete_authorization_requests_before(now - self.settings.authorization_request_lifetime)
            .await
        {
            Ok(removed) => report.authorization_requests_removed = removed,
            Err(e) => {
                tracing::warn!(
                    name = "reaper.authorization_requests",
                    error = %e,
                    "Failed to purge authorization requests"
                );
                report.failures += 1;
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                tokens_removed = report.tokens_removed,
                email_requests_removed = report.email_requests_removed,
                pending_codes_removed = report.pending_codes_removed,
                authorization_requests_removed = report.authorization_requests_removed,
                failures = report.failures,
                "Expiry sweep finished"
            );
        }
        report
    }

    /// Sweep now and then once per interval until the handle is shut down.
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    changed = shutdown_rx.changed() => {
                        // Sender dropped or shutdown requested.
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Expiry reaper stopped");
        });
        ReaperHandle { shutdown_tx, task }
    }
}

pub struct ReaperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop the reaper and wait for a running sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Expiry reaper task failed");
        }
    }
}
