//! Templated outbound mail with a fixed retry policy.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{MailConfig, SmtpConfig};

pub const MAX_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum MailError {
    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("mail transport unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub enum Template {
    UserWelcome {
        user_id: Uuid,
        activation_token: String,
    },
}

impl Template {
    pub fn subject(&self) -> String {
        match self {
            Template::UserWelcome { .. } => "Welcome to Marquee!".to_string(),
        }
    }

    pub fn plain_body(&self) -> String {
        match self {
            Template::UserWelcome { user_id, activation_token } => format!(
                "Hi,\n\n\
                 Thanks for signing up for a Marquee account. We're excited to have you on board!\n\n\
                 For future reference, your user ID number is {user_id}.\n\n\
                 Please send a request to the `PUT /v1/users/activated` endpoint with the following \
                 JSON body to activate your account:\n\n\
                 {{\"token\": \"{activation_token}\"}}\n\n\
                 Please note that this is a one-time use token and it will expire in 3 days.\n\n\
                 Thanks,\n\nThe Marquee Team\n"
            ),
        }
    }

    pub fn html_body(&self) -> String {
        match self {
            Template::UserWelcome { user_id, activation_token } => format!(
                "<!doctype html>\n<html>\n<head>\n<meta name=\"viewport\" content=\"width=device-width\" />\n\
                 <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\" />\n</head>\n<body>\n\
                 <p>Hi,</p>\n\
                 <p>Thanks for signing up for a Marquee account. We're excited to have you on board!</p>\n\
                 <p>For future reference, your user ID number is {user_id}.</p>\n\
                 <p>Please send a request to the <code>PUT /v1/users/activated</code> endpoint with the \
                 following JSON body to activate your account:</p>\n\
                 <pre><code>{{\"token\": \"{activation_token}\"}}</code></pre>\n\
                 <p>Please note that this is a one-time use token and it will expire in 3 days.</p>\n\
                 <p>Thanks,</p>\n<p>The Marquee Team</p>\n</body>\n</html>\n"
            ),
        }
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<(), MailError>;
}

impl Message {
    /// MIME form: plain text with an HTML alternative.
    pub fn to_email(&self) -> Result<lettre::Message, MailError> {
        let email = lettre::Message::builder()
            .from(self.from.parse::<Mailbox>()?)
            .to(self.to.parse::<Mailbox>()?)
            .subject(self.subject.clone())
            .multipart(MultiPart::alternative_plain_html(self.text.clone(), self.html.clone()))?;
        Ok(email)
    }
}

/// Delivers through an SMTP server. Port 465 gets implicit TLS; any other
/// port upgrades with STARTTLS when the server offers it.
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let tls = TlsParameters::new(config.host.clone())?;
        let tls = if config.port == 465 { Tls::Wrapper(tls) } else { Tls::Opportunistic(tls) };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
            .port(config.port)
            .tls(tls)
            .timeout(Some(Duration::from_secs(10)));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self { transport: builder.build() })
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn deliver(&self, message: &Message) -> Result<(), MailError> {
        let email = message.to_email()?;
        self.transport.send(email).await?;
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn deliver(&self, message: &Message) -> Result<(), MailError> {
        tracing::info!(to = %message.to, subject = %message.subject, body = %message.text, "mail not sent (no SMTP host configured)");
        Ok(())
    }
}

#[derive(Clone)]
pub struct Mailer {
    transport: Arc<dyn MailTransport>,
    sender: String,
    retry_delay: Duration,
}

impl Mailer {
    pub fn new(transport: Arc<dyn MailTransport>, sender: impl Into<String>) -> Self {
        Self {
            transport,
            sender: sender.into(),
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let transport: Arc<dyn MailTransport> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpTransport::new(smtp)?),
            None => Arc::new(LogTransport),
        };
        Ok(Self::new(transport, config.sender.clone()))
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn render(&self, recipient: &str, template: &Template) -> Message {
        Message {
            from: self.sender.clone(),
            to: recipient.to_string(),
            subject: template.subject(),
            text: template.plain_body(),
            html: template.html_body(),
        }
    }

    /// Up to [`MAX_ATTEMPTS`] deliveries, [`RETRY_DELAY`] apart. The last
    /// error is returned.
    pub async fn send(&self, recipient: &str, template: Template) -> Result<(), MailError> {
        let message = self.render(recipient, &template);

        let mut attempt = 1;
        loop {
            match self.transport.deliver(&message).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "mail delivery failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
