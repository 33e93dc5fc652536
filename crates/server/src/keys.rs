//! ID token signing keys.
//!
//! Keys are RSA-2048, persisted as PKCS#8 PEM through the [`Store`]. The key id is the
//! RFC 7638 thumbprint of the public key. The first persisted key is the active one;
//! the rest are only published.

use crate::entity::signing_key;
use crate::store::{Store, StoreError};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::EncodingKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use utoipa::ToSchema;

const KEY_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("RSA key generation failed: {0}")]
    Generate(#[from] rsa::Error),
    #[error("Invalid PKCS#8 key: {0}")]
    Pkcs8(#[from] rsa::pkcs8::Error),
    #[error("Key rejected by JWT library: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Key generation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A single public key in JWK form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// A loaded private key ready for signing.
pub struct SigningKey {
    kid: String,
    public: RsaPublicKey,
    encoding_key: EncodingKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey").field("kid", &self.kid).finish()
    }
}

impl SigningKey {
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, KeyError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)?;
        let public = private.to_public_key();
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())?;
        Ok(Self {
            kid: thumbprint(&public),
            public,
            encoding_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn public_jwk(&self) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            alg: "RS256".to_string(),
            key_use: "sig".to_string(),
            kid: self.kid.clone(),
            n: URL_SAFE_NO_PAD.encode(self.public.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(self.public.e().to_bytes_be()),
        }
    }
}

/// RFC 7638 JWK thumbprint: members in lexicographic order, no whitespace.
fn thumbprint(public: &RsaPublicKey) -> String {
    let canonical = format!(
        r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#,
        URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
    );
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

/// Generate a fresh RSA key and return it as PKCS#8 PEM.
///
/// CPU bound; call from a blocking context.
pub fn generate_pkcs8_pem() -> Result<String, KeyError> {
    let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)?;
    Ok(private.to_pkcs8_pem(LineEnding::LF)?.to_string())
}

#[derive(Debug)]
pub struct KeyManager {
    keys: Vec<SigningKey>,
}

impl KeyManager {
    pub fn new(keys: Vec<SigningKey>) -> Self {
        Self { keys }
    }

    /// Load the persisted key set, generating and storing a first key if there is none.
    #[tracing::instrument(skip(store))]
    pub async fn load_or_generate(store: &dyn Store) -> Result<Self, KeyError> {
        let stored = store.signing_keys().await?;
        if !stored.is_empty() {
            let keys = stored
                .iter()
                .map(|k| SigningKey::from_pkcs8_pem(&k.private_key_pem))
                .collect::<Result<Vec<_>, _>>()?;
            tracing::info!(count = keys.len(), active = %keys[0].kid(), "Loaded signing keys");
            return Ok(Self::new(keys));
        }

        tracing::info!("No signing key found, generating a {KEY_BITS} bit RSA key");
        let pem = tokio::task::spawn_blocking(generate_pkcs8_pem).await??;
        let key = SigningKey::from_pkcs8_pem(&pem)?;
        store
            .insert_signing_key(signing_key::Model {
                kid: key.kid().to_string(),
                position: 0,
                private_key_pem: pem,
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;
        tracing::info!(kid = %key.kid(), "Generated signing key");
        Ok(Self::new(vec![key]))
    }

    /// The key new ID tokens are signed with.
    pub fn active(&self) -> Option<&SigningKey> {
        self.keys.first()
    }

    pub fn public_jwks(&self) -> Jwks {
        Jwks {
            keys: self.keys.iter().map(SigningKey::public_jwk).collect(),
        }
    }
}
