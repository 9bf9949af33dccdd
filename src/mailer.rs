use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Message, header::ContentType},
};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};

/// Mailer
///
/// Outbound transactional email. The only message this service sends is the password reset
/// link.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, to_email: &str, username: &str, token: &str) -> AppResult<()>;
}

pub type MailerState = Arc<dyn Mailer>;

pub fn reset_link(frontend_url: &str, token: &str) -> String {
    format!("{}/reset-password/{}", frontend_url.trim_end_matches('/'), token)
}

/// SmtpMailer
///
/// Delivers mail through an SMTP relay. Without a relay URL every send is logged and skipped.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_address: String,
    frontend_url: String,
}

impl SmtpMailer {
    pub fn new(smtp_url: Option<&str>, from_address: &str, frontend_url: &str) -> AppResult<Self> {
        let transport = match smtp_url {
            Some(url) => Some(
                AsyncSmtpTransport::<Tokio1Executor>::from_url(url)
                    .map_err(|e| AppError::Internal(format!("SMTP setup failed: {}", e)))?
                    .build(),
            ),
            None => None,
        };

        Ok(Self {
            transport,
            from_address: from_address.to_string(),
            frontend_url: frontend_url.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_password_reset(&self, to_email: &str, username: &str, token: &str) -> AppResult<()> {
        let Some(transport) = &self.transport else {
            tracing::warn!("Email not configured, skipping password reset email to {}", to_email);
            return Ok(());
        };

        let body = format!(
            "Hello {},\n\n\
             We received a request to reset your NoteHub password. Use the link below to choose a new one:\n\n\
             {}\n\n\
             The link expires in 1 hour and can only be used once. If you did not request a reset, \
             you can ignore this email.\n",
            username,
            reset_link(&self.frontend_url, token)
        );

        let email = Message::builder()
            .from(self.from_address.parse().map_err(|e| {
                AppError::Internal(format!("Invalid from address: {}", e))
            })?)
            .to(to_email.parse().map_err(|e| {
                AppError::Internal(format!("Invalid to address: {}", e))
            })?)
            .subject("Password Reset Request")
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        transport
            .send(email)
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to send email: {}", e)))?;

        tracing::info!("Sent password reset email to {}", to_email);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub username: String,
    pub token: String,
}

/// MockMailer
///
/// Records every message instead of sending it.
#[derive(Clone, Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_password_reset(&self, to_email: &str, username: &str, token: &str) -> AppResult<()> {
        self.sent.lock().await.push(SentMail {
            to: to_email.to_string(),
            username: username.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }
}
