//! Delivery of one-time sign-in codes.

use crate::config::SmtpConfig;
use askama::Template;
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),
    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("Failed to render email: {0}")]
    Template(#[from] askama::Error),
}

impl MailError {
    /// Whether the failure was caused by the recipient address rather than delivery.
    pub fn is_invalid_address(&self) -> bool {
        matches!(self, MailError::InvalidAddress(_))
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send `code` to `address`. `validity_minutes` is shown to the recipient.
    async fn send_code(
        &self,
        address: &str,
        code: &str,
        validity_minutes: i64,
    ) -> Result<(), MailError>;
}

#[derive(Template)]
#[template(path = "verification_code_email.html")]
struct VerificationCodeHtml<'a> {
    email: &'a str,
    code: &'a str,
    validity_minutes: i64,
}

#[derive(Template)]
#[template(path = "verification_code_email.txt")]
struct VerificationCodeText<'a> {
    email: &'a str,
    code: &'a str,
    validity_minutes: i64,
}

/// [`Mailer`] that relays through an SMTP server.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)?
            .port(config.port)
            .credentials(creds)
            .build();
        Ok(Self::with_transport(transport, config.from.parse()?))
    }

    pub fn with_transport(transport: AsyncSmtpTransport<Tokio1Executor>, from: Mailbox) -> Self {
        Self { transport, from }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[tracing::instrument(skip(self, code))]
    async fn send_code(
        &self,
        address: &str,
        code: &str,
        validity_minutes: i64,
    ) -> Result<(), MailError> {
        let to: Mailbox = address.parse()?;
        let html_body = VerificationCodeHtml {
            email: address,
            code,
            validity_minutes,
        }
        .render()?;
        let text_body = VerificationCodeText {
            email: address,
            code,
            validity_minutes,
        }
        .render()?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(format!("Your sign-in code: {code}"))
            .header(lettre::message::header::MIME_VERSION_1_0)
            .message_id(None)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        self.transport.send(message).await?;
        tracing::info!(name = "mailer.code_sent", "Sent verification code");
        Ok(())
    }
}
