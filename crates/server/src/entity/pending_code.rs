//! Approved authorization codes awaiting redemption at `/token`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pending_code")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    /// Unsigned ID token claims, serialized as JSON.
    #[sea_orm(column_type = "Text")]
    pub claims: String,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_older_than(&self, lifetime: Duration, now: OffsetDateTime) -> bool {
        now - self.created_at >= lifetime
    }
}
