//! Turns an ID token claim set into a compact JWS.

use crate::keys::SigningKey;
use crate::oauth2::IdTokenClaims;
use jsonwebtoken::{Algorithm, Header};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("No active signing key")]
    NoActiveKey,
    #[error("Signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

pub trait Signer: Send + Sync {
    fn sign(&self, claims: &IdTokenClaims, key: &SigningKey) -> Result<String, SignError>;
}

/// RS256 with the key id in the JOSE header.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rs256Signer;

impl Signer for Rs256Signer {
    fn sign(&self, claims: &IdTokenClaims, key: &SigningKey) -> Result<String, SignError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid().to_string());
        Ok(jsonwebtoken::encode(&header, claims, key.encoding_key())?)
    }
}
