//! SeaORM backed [`Store`] for SQLite and Postgres.

use super::{Store, StoreError};
use crate::entity::{
    access_token, authorization_request, email_validation_request, identity, login_mapping,
    login_session, pending_code, signing_key,
};
use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone, Debug)]
pub struct DbStore {
    pub(crate) db: Arc<DatabaseConnection>,
}

impl DbStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    async fn find_identity(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<identity::Model>, StoreError> {
        Ok(identity::Entity::find()
            .filter(identity::Column::Provider.eq(provider))
            .filter(identity::Column::ProviderId.eq(provider_id))
            .one(self.connection())
            .await?)
    }
}

#[async_trait]
impl Store for DbStore {
    async fn ensure_identity(
        &self,
        email: &str,
        provider: &str,
        provider_id: &str,
    ) -> Result<identity::Model, StoreError> {
        if let Some(existing) = self.find_identity(provider, provider_id).await? {
            return Ok(existing);
        }

        let created = identity::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            email: Set(email.to_string()),
            provider: Set(provider.to_string()),
            provider_id: Set(provider_id.to_string()),
            created_at: Set(OffsetDateTime::now_utc()),
        }
        .insert(self.connection())
        .await;

        match created {
            Ok(model) => Ok(model),
            // A concurrent login for the same address won the unique index.
            Err(e) => match self.find_identity(provider, provider_id).await? {
                Some(existing) => Ok(existing),
                None => Err(e.into()),
            },
        }
    }

    async fn get_identity(&self, id: &str) -> Result<Option<identity::Model>, StoreError> {
        Ok(identity::Entity::find_by_id(id)
            .one(self.connection())
            .await?)
    }

    async fn identities_for_login_key(
        &self,
        login_key_hash: &str,
    ) -> Result<Vec<identity::Model>, StoreError> {
        let ids: Vec<String> = login_mapping::Entity::find()
            .select_only()
            .column(login_mapping::Column::IdentityId)
            .filter(login_mapping::Column::LoginKeyHash.eq(login_key_hash))
            .order_by_asc(login_mapping::Column::Id)
            .into_tuple()
            .all(self.connection())
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut identities = identity::Entity::find()
            .filter(identity::Column::Id.is_in(ids.clone()))
            .all(self.connection())
            .await?;
        identities.sort_by_key(|i| ids.iter().position(|id| *id == i.id));
        Ok(identities)
    }

    async fn create_login_session(&self, login_key_hash: &str) -> Result<(), StoreError> {
        login_session::ActiveModel {
            login_key_hash: Set(login_key_hash.to_string()),
            created_at: Set(OffsetDateTime::now_utc()),
        }
        .insert(self.connection())
        .await?;
        Ok(())
    }

    async fn login_session_exists(&self, login_key_hash: &str) -> Result<bool, StoreError> {
        Ok(login_session::Entity::find_by_id(login_key_hash)
            .one(self.connection())
            .await?
            .is_some())
    }

    async fn delete_login_session(&self, login_key_hash: &str) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;
        login_mapping::Entity::delete_many()
            .filter(login_mapping::Column::LoginKeyHash.eq(login_key_hash))
            .exec(&txn)
            .await?;
        login_session::Entity::delete_by_id(login_key_hash)
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn ensure_login_mapping(
        &self,
        login_key_hash: &str,
        identity_id: &str,
    ) -> Result<(), StoreError> {
        if self.login_mapping_exists(login_key_hash, identity_id).await? {
            return Ok(());
        }
        let inserted = login_mapping::ActiveModel {
            id: NotSet,
            login_key_hash: Set(login_key_hash.to_string()),
            identity_id: Set(identity_id.to_string()),
            created_at: Set(OffsetDateTime::now_utc()),
        }
        .insert(self.connection())
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(_) if self.login_mapping_exists(login_key_hash, identity_id).await? => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn login_mapping_exists(
        &self,
        login_key_hash: &str,
        identity_id: &str,
    ) -> Result<bool, StoreError> {
        let count = login_mapping::Entity::find()
            .filter(login_mapping::Column::LoginKeyHash.eq(login_key_hash))
            .filter(login_mapping::Column::IdentityId.eq(identity_id))
            .count(self.connection())
            .await?;
        Ok(count > 0)
    }

    async fn insert_authorization_request(
        &self,
        request: authorization_request::Model,
    ) -> Result<(), StoreError> {
        authorization_request::ActiveModel {
            id: Set(request.id),
            login_key_hash: Set(request.login_key_hash),
            raw_query: Set(request.raw_query),
            client_id: Set(request.client_id),
            redirect_uri: Set(request.redirect_uri),
            state: Set(request.state),
            scope: Set(request.scope),
            nonce: Set(request.nonce),
            created_at: Set(request.created_at),
        }
        .insert(self.connection())
        .await?;
        Ok(())
    }

    async fn get_authorization_request(
        &self,
        id: &str,
    ) -> Result<Option<authorization_request::Model>, StoreError> {
        Ok(authorization_request::Entity::find_by_id(id)
            .one(self.connection())
            .await?)
    }

    async fn delete_authorization_request(&self, id: &str) -> Result<(), StoreError> {
        authorization_request::Entity::delete_by_id(id)
            .exec(self.connection())
            .await?;
        Ok(())
    }

    async fn insert_pending_code(&self, code: pending_code::Model) -> Result<(), StoreError> {
        pending_code::ActiveModel {
            code: Set(code.code),
            claims: Set(code.claims),
            created_at: Set(code.created_at),
        }
        .insert(self.connection())
        .await?;
        Ok(())
    }

    async fn take_pending_code(
        &self,
        code: &str,
    ) -> Result<Option<pending_code::Model>, StoreError> {
        let Some(pending) = pending_code::Entity::find_by_id(code)
            .one(self.connection())
            .await?
        else {
            return Ok(None);
        };

        let deleted = pending_code::Entity::delete_by_id(code)
            .exec(self.connection())
            .await?;
        // Whoever deleted the row owns the code.
        if deleted.rows_affected == 1 {
            Ok(Some(pending))
        } else {
            Ok(None)
        }
    }

    async fn insert_access_token(&self, token: access_token::Model) -> Result<(), StoreError> {
        access_token::ActiveModel {
            token_hash: Set(token.token_hash),
            identity_id: Set(token.identity_id),
            issued_at: Set(token.issued_at),
            lifetime_secs: Set(token.lifetime_secs),
            authorization_code: Set(token.authorization_code),
        }
        .insert(self.connection())
        .await?;
        Ok(())
    }

    async fn get_access_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<access_token::Model>, StoreError> {
        Ok(access_token::Entity::find_by_id(token_hash)
            .one(self.connection())
            .await?)
    }

    async fn delete_access_token(&self, token_hash: &str) -> Result<bool, StoreError> {
        let res = access_token::Entity::delete_by_id(token_hash)
            .exec(self.connection())
            .await?;
        Ok(res.rows_affected > 0)
    }

    async fn find_access_token_by_code(
        &self,
        authorization_code: &str,
    ) -> Result<Option<access_token::Model>, StoreError> {
        Ok(access_token::Entity::find()
            .filter(access_token::Column::AuthorizationCode.eq(authorization_code))
            .one(self.connection())
            .await?)
    }

    async fn access_token_hashes(&self) -> Result<Vec<String>, StoreError> {
        Ok(access_token::Entity::find()
            .select_only()
            .column(access_token::Column::TokenHash)
            .into_tuple()
            .all(self.connection())
            .await?)
    }

    async fn insert_email_request(
        &self,
        request: email_validation_request::Model,
    ) -> Result<(), StoreError> {
        email_validation_request::ActiveModel {
            id: Set(request.id),
            email: Set(request.email),
            code_hash: Set(request.code_hash),
            attempts: Set(request.attempts),
            created_at: Set(request.created_at),
        }
        .insert(self.connection())
        .await?;
        Ok(())
    }

    async fn get_email_request(
        &self,
        id: &str,
    ) -> Result<Option<email_validation_request::Model>, StoreError> {
        Ok(email_validation_request::Entity::find_by_id(id)
            .one(self.connection())
            .await?)
    }

    async fn delete_email_request(&self, id: &str) -> Result<bool, StoreError> {
        let res = email_validation_request::Entity::delete_by_id(id)
            .exec(self.connection())
            .await?;
        Ok(res.rows_affected == 1)
    }

    async fn claim_email_code_attempt(
        &self,
        id: &str,
        max_attempts: i32,
    ) -> Result<bool, StoreError> {
        // Check and increment in one statement so concurrent guesses cannot overshoot.
        let res = email_validation_request::Entity::update_many()
            .col_expr(
                email_validation_request::Column::Attempts,
                Expr::col(email_validation_request::Column::Attempts).add(1),
            )
            .filter(email_validation_request::Column::Id.eq(id))
            .filter(email_validation_request::Column::Attempts.lt(max_attempts))
            .exec(self.connection())
            .await?;
        Ok(res.rows_affected == 1)
    }

    async fn delete_email_requests_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let res = email_validation_request::Entity::delete_many()
            .filter(email_validation_request::Column::CreatedAt.lte(cutoff))
            .exec(self.connection())
            .await?;
        Ok(res.rows_affected)
    }

    async fn delete_authorization_requests_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let res = authorization_request::Entity::delete_many()
            .filter(authorization_request::Column::CreatedAt.lte(cutoff))
            .exec(self.connection())
            .await?;
        Ok(res.rows_affected)
    }

    async fn delete_pending_codes_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let res = pending_code::Entity::delete_many()
            .filter(pending_code::Column::CreatedAt.lte(cutoff))
            .exec(self.connection())
            .await?;
        Ok(res.rows_affected)
    }

    async fn signing_keys(&self) -> Result<Vec<signing_key::Model>, StoreError> {
        Ok(signing_key::Entity::find()
            .order_by_asc(signing_key::Column::Position)
            .all(self.connection())
            .await?)
    }

    async fn insert_signing_key(&self, key: signing_key::Model) -> Result<(), StoreError> {
        signing_key::ActiveModel {
            kid: Set(key.kid),
            position: Set(key.position),
            private_key_pem: Set(key.private_key_pem),
            created_at: Set(key.created_at),
        }
        .insert(self.connection())
        .await?;
        Ok(())
    }
}
