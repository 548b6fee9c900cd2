//! The outbound email collaborator.
//!
//! Two messages travel during a share: the share notification and the
//! verification code. They are deliberately sent as separate emails so
//! that the share reference and its unlock code never ride in the same
//! channel.

use crate::Id;
use async_trait::async_trait;
use serde_derive::Serialize;
use std::sync::Mutex;

/// Configuration for the HTTP mailer, injected at construction instead of
/// being read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailConfig {
    /// e.g. `https://api.sendgrid.com`.
    pub base_url: String,
    pub api_key: String,
    /// The `from` address stamped on every message.
    pub sender: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Unable to send the email request")]
    HttpClient(
        #[source]
        #[from]
        reqwest::Error,
    ),
    #[error("The mail service rejected the message: {0}")]
    Rejected(String),
}

/// The delivery channel for share notifications and verification codes.
///
/// Delivery failures must surface as [`EmailError`]s; callers decide what
/// to do with them. Retrying transient failures is this collaborator's
/// business, not the caller's.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_share_notification(
        &self,
        recipient: &str,
        secret_name: &str,
        share_id: &Id,
    ) -> Result<(), EmailError>;

    async fn send_verification_code(
        &self,
        recipient: &str,
        code: u32,
    ) -> Result<(), EmailError>;
}

/// Sends mail through a SendGrid-style JSON API.
#[derive(Debug, Clone)]
pub struct HttpEmailer {
    client: reqwest::Client,
    config: EmailConfig,
}

impl HttpEmailer {
    pub fn new(client: reqwest::Client, config: EmailConfig) -> Self {
        HttpEmailer { client, config }
    }

    async fn send(&self, message: &Message<'_>) -> Result<(), EmailError> {
        let url = format!("{}/v3/mail/send", self.config.base_url);

        log::debug!("Sending an email request to {}", url);
        log::trace!("Payload: {:#?}", message);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            log::error!("The mail service answered {}", status);
            return Err(EmailError::Rejected(status.to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl EmailSender for HttpEmailer {
    async fn send_share_notification(
        &self,
        recipient: &str,
        secret_name: &str,
        share_id: &Id,
    ) -> Result<(), EmailError> {
        let message = Message {
            to: recipient,
            from: &self.config.sender,
            subject: "A secret has been shared with you".to_string(),
            body: format!(
                "The secret \"{}\" has been shared with your account. \
                 Accept it with share reference {}.",
                secret_name, share_id,
            ),
        };

        self.send(&message).await
    }

    async fn send_verification_code(
        &self,
        recipient: &str,
        code: u32,
    ) -> Result<(), EmailError> {
        let message = Message {
            to: recipient,
            from: &self.config.sender,
            subject: "Your verification code".to_string(),
            body: format!("Your one-time verification code is {}.", code),
        };

        self.send(&message).await
    }
}

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    to: &'a str,
    from: &'a str,
    subject: String,
    body: String,
}

/// Records every message instead of delivering anything. Used by the demo
/// binary and the tests.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
}

/// A message captured by [`RecordingMailer`].
#[derive(Debug, Clone, PartialEq)]
pub enum SentEmail {
    ShareNotification {
        recipient: String,
        secret_name: String,
        share_id: Id,
    },
    VerificationCode {
        recipient: String,
        code: u32,
    },
}

impl RecordingMailer {
    pub fn new() -> Self { RecordingMailer::default() }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The code carried by the most recent verification email, if any.
    pub fn last_verification_code(&self) -> Option<u32> {
        self.sent().iter().rev().find_map(|message| match message {
            SentEmail::VerificationCode { code, .. } => Some(*code),
            _ => None,
        })
    }

    fn record(&self, message: SentEmail) {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send_share_notification(
        &self,
        recipient: &str,
        secret_name: &str,
        share_id: &Id,
    ) -> Result<(), EmailError> {
        self.record(SentEmail::ShareNotification {
            recipient: recipient.to_string(),
            secret_name: secret_name.to_string(),
            share_id: share_id.clone(),
        });

        Ok(())
    }

    async fn send_verification_code(
        &self,
        recipient: &str,
        code: u32,
    ) -> Result<(), EmailError> {
        self.record(SentEmail::VerificationCode {
            recipient: recipient.to_string(),
            code,
        });

        Ok(())
    }
}
