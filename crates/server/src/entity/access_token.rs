//! Bearer tokens handed out by `/token`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "access_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub token_hash: String,
    pub identity_id: String,
    pub issued_at: OffsetDateTime,
    pub lifetime_secs: i64,
    /// The code this token was redeemed from. Kept to detect replays.
    pub authorization_code: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn expires_at(&self) -> OffsetDateTime {
        self.issued_at + Duration::seconds(self.lifetime_secs)
    }

    /// Check if the token has expired as of `now`
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at() <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }
}
