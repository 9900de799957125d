//! Outbound email dispatch for verification and password-reset links.
//!
//! Callers treat delivery as fire-and-forget: the verification record
//! already exists when dispatch starts, so a failed send is logged and the
//! user resends from the client. Nothing on the request path blocks on the
//! mail transport.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
};
use tracing::info;

/// Email dispatch error.
#[derive(Debug)]
pub enum EmailError {
    /// Transport-level send failure
    SendFailed(String),
    /// Bad address or transport configuration
    InvalidConfig(String),
}

impl std::fmt::Display for EmailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailError::SendFailed(e) => write!(f, "Failed to send email: {}", e),
            EmailError::InvalidConfig(e) => write!(f, "Invalid email configuration: {}", e),
        }
    }
}

impl std::error::Error for EmailError {}

/// Outbound mail delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver an email-verification link.
    async fn send_verification_link(&self, to: &str, link: &str) -> Result<(), EmailError>;

    /// Deliver a password-reset link.
    async fn send_password_reset_link(&self, to: &str, link: &str) -> Result<(), EmailError>;
}

/// SMTP-backed mailer.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        from_address: String,
    ) -> Result<Self, EmailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| EmailError::InvalidConfig(format!("SMTP relay error: {}", e)))?
            .port(port);

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            transport: builder.build(),
            from_address,
        })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|e| EmailError::InvalidConfig(format!("Invalid from address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| EmailError::InvalidConfig(format!("Invalid to address: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| EmailError::SendFailed(format!("Failed to build email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification_link(&self, to: &str, link: &str) -> Result<(), EmailError> {
        self.send(
            to,
            "Verify your email address",
            format!(
                "Welcome! Confirm your email address by opening this link:\n\n{}\n\n\
                 The link expires in 15 minutes.",
                link
            ),
        )
        .await
    }

    async fn send_password_reset_link(&self, to: &str, link: &str) -> Result<(), EmailError> {
        self.send(
            to,
            "Reset your password",
            format!(
                "A password reset was requested for your account. Open this link to continue:\n\n{}\n\n\
                 The link expires in 15 minutes. If you did not request this, ignore this email.",
                link
            ),
        )
        .await
    }
}

/// Log-only mailer for development and tests. Records nothing, sends
/// nothing, always succeeds.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification_link(&self, to: &str, link: &str) -> Result<(), EmailError> {
        info!(to = %to, link = %link, "Would send verification email");
        Ok(())
    }

    async fn send_password_reset_link(&self, to: &str, link: &str) -> Result<(), EmailError> {
        info!(to = %to, link = %link, "Would send password reset email");
        Ok(())
    }
}
