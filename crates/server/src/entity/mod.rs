//! SeaORM entities for everything the provider persists.

pub mod access_token;
pub mod authorization_request;
pub mod email_validation_attempt;
pub mod email_validation_request;
pub mod identity;
pub mod login_mapping;
pub mod login_session;
pub mod pending_code;
pub mod signing_key;
