//! Admission log for email verification.
//!
//! Every verification mail is recorded against a hash of whoever asked for it, so
//! the number of mails one requester can trigger per window is bounded no matter
//! how many different addresses they target.

use crate::entity::email_validation_attempt;
use crate::secrets::hash_secret;
use crate::store::{DbStore, StoreError};
use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, EntityTrait,
    QueryFilter, QuerySelect,
};
use std::collections::HashMap;
use time::OffsetDateTime;

#[async_trait]
pub trait AdmissionLog: Send + Sync {
    /// Append an attempt by `requester` to mail `target_email`.
    async fn record(&self, requester: &str, target_email: &str) -> Result<(), StoreError>;

    /// Attempts strictly after `cutoff`, keyed by hashed requester.
    async fn count_since(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<HashMap<String, u64>, StoreError>;
}

#[async_trait]
impl AdmissionLog for DbStore {
    async fn record(&self, requester: &str, target_email: &str) -> Result<(), StoreError> {
        email_validation_attempt::ActiveModel {
            id: NotSet,
            hashed_requester_id: Set(hash_secret(requester)),
            hashed_email: Set(hash_secret(target_email)),
            created_at: Set(OffsetDateTime::now_utc()),
        }
        .insert(self.connection())
        .await?;
        Ok(())
    }

    async fn count_since(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<HashMap<String, u64>, StoreError> {
        let rows: Vec<(String, i64)> = email_validation_attempt::Entity::find()
            .select_only()
            .column(email_validation_attempt::Column::HashedRequesterId)
            .column_as(
                Expr::col(email_validation_attempt::Column::Id).count(),
                "attempts",
            )
            .filter(email_validation_attempt::Column::CreatedAt.gt(cutoff))
            .group_by(email_validation_attempt::Column::HashedRequesterId)
            .into_tuple()
            .all(self.connection())
            .await?;

        rows.into_iter()
            .map(|(requester, attempts)| {
                u64::try_from(attempts)
                    .map(|n| (requester, n))
                    .map_err(|_| StoreError::Malformed(format!("negative count {attempts}")))
            })
            .collect()
    }
}

async fn attempts_in_window(
    log: &dyn AdmissionLog,
    requester: &str,
    window: time::Duration,
) -> Result<u64, StoreError> {
    let counts = log.count_since(OffsetDateTime::now_utc() - window).await?;
    Ok(counts.get(&hash_secret(requester)).copied().unwrap_or(0))
}

/// Whether `requester` may trigger another verification mail.
pub async fn admit(
    log: &dyn AdmissionLog,
    requester: &str,
    window: time::Duration,
    max_requests: u64,
) -> Result<bool, StoreError> {
    Ok(attempts_in_window(log, requester, window).await? < max_requests)
}

/// Record an attempt, then admit it if it is within the first `max_requests` of the
/// window.
///
/// The count includes the attempt just written, so concurrent callers cannot all read
/// the same stale total. Rejected attempts stay in the log.
pub async fn record_and_admit(
    log: &dyn AdmissionLog,
    requester: &str,
    target_email: &str,
    window: time::Duration,
    max_requests: u64,
) -> Result<bool, StoreError> {
    log.record(requester, target_email).await?;
    Ok(attempts_in_window(log, requester, window).await? <= max_requests)
}
