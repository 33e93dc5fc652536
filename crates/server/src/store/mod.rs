//! Persistence contract of the provider.
//!
//! Every operation is atomic for the single record it touches; nothing here spans
//! records transactionally. Secrets arrive already hashed.

mod db;

pub use db::DbStore;

use crate::entity::{
    access_token, authorization_request, email_validation_request, identity, pending_code,
    signing_key,
};
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
    #[error("Malformed record: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    // Identities

    /// Return the identity for `(provider, provider_id)`, creating it on first sight.
    async fn ensure_identity(
        &self,
        email: &str,
        provider: &str,
        provider_id: &str,
    ) -> Result<identity::Model, StoreError>;

    async fn get_identity(&self, id: &str) -> Result<Option<identity::Model>, StoreError>;

    /// Identities reachable from a session, oldest link first.
    async fn identities_for_login_key(
        &self,
        login_key_hash: &str,
    ) -> Result<Vec<identity::Model>, StoreError>;

    // Sessions and mappings

    async fn create_login_session(&self, login_key_hash: &str) -> Result<(), StoreError>;

    async fn login_session_exists(&self, login_key_hash: &str) -> Result<bool, StoreError>;

    /// Remove a session together with all of its mappings.
    async fn delete_login_session(&self, login_key_hash: &str) -> Result<(), StoreError>;

    async fn ensure_login_mapping(
        &self,
        login_key_hash: &str,
        identity_id: &str,
    ) -> Result<(), StoreError>;

    async fn login_mapping_exists(
        &self,
        login_key_hash: &str,
        identity_id: &str,
    ) -> Result<bool, StoreError>;

    // Authorization requests

    async fn insert_authorization_request(
        &self,
        request: authorization_request::Model,
    ) -> Result<(), StoreError>;

    async fn get_authorization_request(
        &self,
        id: &str,
    ) -> Result<Option<authorization_request::Model>, StoreError>;

    async fn delete_authorization_request(&self, id: &str) -> Result<(), StoreError>;

    // Pending codes

    async fn insert_pending_code(&self, code: pending_code::Model) -> Result<(), StoreError>;

    /// Read and delete a pending code. Of several concurrent callers at most one
    /// gets `Some`.
    async fn take_pending_code(
        &self,
        code: &str,
    ) -> Result<Option<pending_code::Model>, StoreError>;

    // Access tokens

    async fn insert_access_token(&self, token: access_token::Model) -> Result<(), StoreError>;

    async fn get_access_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<access_token::Model>, StoreError>;

    /// Returns whether a token was actually removed.
    async fn delete_access_token(&self, token_hash: &str) -> Result<bool, StoreError>;

    async fn find_access_token_by_code(
        &self,
        authorization_code: &str,
    ) -> Result<Option<access_token::Model>, StoreError>;

    async fn access_token_hashes(&self) -> Result<Vec<String>, StoreError>;

    // Email validation requests

    async fn insert_email_request(
        &self,
        request: email_validation_request::Model,
    ) -> Result<(), StoreError>;

    async fn get_email_request(
        &self,
        id: &str,
    ) -> Result<Option<email_validation_request::Model>, StoreError>;

    /// Returns whether this call removed the request. Of several concurrent callers
    /// at most one gets `true`.
    async fn delete_email_request(&self, id: &str) -> Result<bool, StoreError>;

    /// Count one code check against the request, unless it already had
    /// `max_attempts`. Returns whether the attempt was granted.
    async fn claim_email_code_attempt(
        &self,
        id: &str,
        max_attempts: i32,
    ) -> Result<bool, StoreError>;

    /// Drop every request created at or before `cutoff`; returns how many went.
    async fn delete_email_requests_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError>;

    /// Drop authorization requests created at or before `cutoff`.
    async fn delete_authorization_requests_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError>;

    /// Drop unredeemed codes created at or before `cutoff`.
    async fn delete_pending_codes_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError>;

    // Signing keys

    /// All keys ordered by position, active key first.
    async fn signing_keys(&self) -> Result<Vec<signing_key::Model>, StoreError>;

    async fn insert_signing_key(&self, key: signing_key::Model) -> Result<(), StoreError>;
}
