//! An in-progress `/auth` flow.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "authorization_request")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Hash of the caller's login key at the time of the request, if it had one.
    pub login_key_hash: Option<String>,
    /// Query string exactly as received, used to re-enter `/auth` after login.
    #[sea_orm(column_type = "Text")]
    pub raw_query: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub state: Option<String>,
    pub scope: Option<String>,
    pub nonce: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the request was started by the session with this login key hash.
    pub fn is_owned_by(&self, login_key_hash: &str) -> bool {
        self.login_key_hash.as_deref() == Some(login_key_hash)
    }
}
