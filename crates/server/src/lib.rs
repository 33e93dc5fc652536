//! An OpenID Connect provider with passwordless email-code login.
//!
//! Users prove control of an address by entering a code mailed to them, pick the
//! identity to use for a relying party, and the party redeems the resulting
//! single-use authorization code for an opaque access token and an RS256 signed
//! ID token.

use std::sync::Arc;

use crate::admission::AdmissionLog;
use crate::config::AppConfig;
use crate::email_verification::EmailVerifier;
use crate::keys::KeyManager;
use crate::mailer::Mailer;
use crate::signer::Signer;
use crate::store::Store;

pub mod admission;
pub mod api;
pub mod config;
pub mod email_verification;
pub mod entity;
pub mod error;
pub mod keys;
pub mod mailer;
pub mod oauth2;
pub mod reaper;
pub mod secrets;
pub mod signer;
pub mod store;

/// Everything a request handler or background task may touch, built once at startup.
#[derive(Clone)]
pub struct AppResources {
    pub store: Arc<dyn Store>,
    pub admission: Arc<dyn AdmissionLog>,
    pub email: Arc<EmailVerifier>,
    pub keys: Arc<KeyManager>,
    pub signer: Arc<dyn Signer>,
    pub config: Arc<AppConfig>,
}

impl AppResources {
    pub fn new(
        store: Arc<dyn Store>,
        admission: Arc<dyn AdmissionLog>,
        mailer: Arc<dyn Mailer>,
        keys: Arc<KeyManager>,
        signer: Arc<dyn Signer>,
        config: Arc<AppConfig>,
    ) -> Self {
        let email = Arc::new(EmailVerifier::new(
            store.clone(),
            admission.clone(),
            mailer,
            config.email_verification.clone(),
        ));
        Self {
            store,
            admission,
            email,
            keys,
            signer,
            config,
        }
    }
}
