//! One-time email codes.
//!
//! [`EmailVerifier::start_email_validation`] mails a code and returns an opaque request
//! id; [`EmailVerifier::complete_email_validation`] checks a code against that id and
//! yields the verified address. What the caller does with the address (identities,
//! sessions) is not this module's business.

use crate::admission::{self, AdmissionLog};
use crate::config::EmailVerificationConfig;
use crate::entity::email_validation_request;
use crate::mailer::{MailError, Mailer};
use crate::secrets::{generate_numeric_code, generate_token, hash_secret};
use crate::store::{Store, StoreError};
use std::sync::Arc;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

const CODE_DIGITS: u32 = 6;

#[derive(Debug, Error)]
pub enum EmailValidationError {
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Too many verification emails requested, try again later")]
    RateLimited,
    #[error("Unknown or already used verification request")]
    NotFound,
    #[error("The code does not match")]
    CodeMismatch,
    #[error("The code has expired")]
    Expired,
    #[error("Too many wrong codes, request a new one")]
    AttemptsExhausted,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Failed to send verification email: {0}")]
    Delivery(#[from] MailError),
    #[error("Randomness unavailable: {0}")]
    Randomness(#[from] getrandom::Error),
}

pub struct EmailVerifier {
    store: Arc<dyn Store>,
    admission: Arc<dyn AdmissionLog>,
    mailer: Arc<dyn Mailer>,
    settings: EmailVerificationConfig,
}

impl EmailVerifier {
    pub fn new(
        store: Arc<dyn Store>,
        admission: Arc<dyn AdmissionLog>,
        mailer: Arc<dyn Mailer>,
        settings: EmailVerificationConfig,
    ) -> Self {
        Self {
            store,
            admission,
            mailer,
            settings,
        }
    }

    pub fn code_validity(&self) -> Duration {
        Duration::seconds(self.settings.code_validity_secs)
    }

    /// Mail a fresh code to `email` on behalf of `requester` and return the request id.
    #[tracing::instrument(skip(self, requester))]
    pub async fn start_email_validation(
        &self,
        requester: &str,
        email: &str,
    ) -> Result<String, EmailValidationError> {
        let email = normalize_email(email).ok_or(EmailValidationError::InvalidEmail)?;

        let admitted = admission::record_and_admit(
            self.admission.as_ref(),
            requester,
            &email,
            Duration::seconds(self.settings.rate_limit_window_secs),
            self.settings.rate_limit_max_requests,
        )
        .await?;
        if !admitted {
            tracing::warn!(
                name = "email_verification.rate_limited",
                "Rejected verification email, requester over its limit"
            );
            return Err(EmailValidationError::RateLimited);
        }

        let code = generate_numeric_code(CODE_DIGITS)?;
        let id = generate_token()?;
        self.store
            .insert_email_request(email_validation_request::Model {
                id: id.clone(),
                email: email.clone(),
                code_hash: hash_secret(&code),
                attempts: 0,
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;

        if let Err(e) = self
            .mailer
            .send_code(&email, &code, (self.settings.code_validity_secs / 60).max(1))
            .await
        {
            // Nobody can ever complete this request.
            self.store.delete_email_request(&id).await?;
            return Err(if e.is_invalid_address() {
                EmailValidationError::InvalidEmail
            } else {
                e.into()
            });
        }
        Ok(id)
    }

    /// Check `code` against the request and return the verified address.
    ///
    /// A request is consumed on success, discarded once expired and discarded after
    /// `max_code_attempts` checks. Of concurrent callers presenting the right code only
    /// one succeeds.
    #[tracing::instrument(skip(self, code))]
    pub async fn complete_email_validation(
        &self,
        email_request_id: &str,
        code: &str,
    ) -> Result<String, EmailValidationError> {
        let request = self
            .store
            .get_email_request(email_request_id)
            .await?
            .ok_or(EmailValidationError::NotFound)?;

        if !self
            .store
            .claim_email_code_attempt(&request.id, self.settings.max_code_attempts)
            .await?
        {
            if !self.store.delete_email_request(&request.id).await? {
                // Completed or discarded since it was read.
                return Err(EmailValidationError::NotFound);
            }
            tracing::warn!(
                name = "email_verification.attempts_exhausted",
                "Discarded verification request after too many code attempts"
            );
            return Err(EmailValidationError::AttemptsExhausted);
        }

        if request.code_hash != hash_secret(code.trim()) {
            return Err(EmailValidationError::CodeMismatch);
        }

        if request.is_older_than(self.code_validity(), OffsetDateTime::now_utc()) {
            self.store.delete_email_request(&request.id).await?;
            return Err(EmailValidationError::Expired);
        }

        if !self.store.delete_email_request(&request.id).await? {
            // Someone else completed it first.
            return Err(EmailValidationError::NotFound);
        }
        Ok(request.email)
    }
}

fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return None;
    }
    Some(email)
}
