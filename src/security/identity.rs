//! Collaborator seams: identity verification and outbound account email.
//!
//! The gateway only checks that a bearer header is well formed. Whether the
//! token is genuine is answered by an [`IdentityVerifier`], normally backed by
//! an external identity provider.

use std::collections::HashMap;

use async_trait::async_trait;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::schema::IdentityConfig;

/// Authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("token rejected")]
    InvalidToken,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Outbound email for account flows.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, email: &str, redirect_to: &str) -> Result<(), MailError>;

    async fn send_contact_message(&self, name: &str, email: &str, message: &str) -> Result<(), MailError>;
}

/// Verifies bearer tokens against a fixed table from config.
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn from_config(config: &IdentityConfig) -> Self {
        Self {
            tokens: config
                .tokens
                .iter()
                .map(|t| (t.token.clone(), t.subject.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        // Scan every entry so lookup time does not depend on which token matched.
        let mut found = None;
        for (known, subject) in &self.tokens {
            let matches = known.len() == token.len() && bool::from(known.as_bytes().ct_eq(token.as_bytes()));
            if matches {
                found = Some(subject.clone());
            }
        }
        found
            .map(|subject| Identity { subject })
            .ok_or(IdentityError::InvalidToken)
    }
}

/// Records outbound mail as structured log events instead of sending it.
#[derive(Debug, Default)]
pub struct LoggingMailer;

#[async_trait]
impl Mailer for LoggingMailer {
    async fn send_password_reset(&self, email: &str, redirect_to: &str) -> Result<(), MailError> {
        tracing::info!(email, redirect_to, "Password reset email queued");
        Ok(())
    }

    async fn send_contact_message(&self, name: &str, email: &str, message: &str) -> Result<(), MailError> {
        tracing::info!(name, email, length = message.len(), "Contact message queued");
        Ok(())
    }
}
