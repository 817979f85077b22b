use crate::config::SmtpConfig;
use crate::{Email, Mailer, MailerError};
use async_trait::async_trait;
use lettre::message::{MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

#[derive(Debug, Clone)]
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpTransport {
    pub fn builder(hostname: &str) -> SmtpTransportBuilder {
        SmtpTransportBuilder::new(hostname)
    }

    pub fn from_config(config: &SmtpConfig) -> Result<Self, MailerError> {
        let mut builder = Self::builder(&config.host)
            .port(config.port)
            .tls(config.tls.into());

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(username, password);
        }

        builder.build()
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl Mailer for SmtpTransport {
    async fn send_email(&self, email: &Email) -> Result<String, MailerError> {
        let message_id = generate_message_id(&email.from);
        let message = build_message(email, &message_id)?;
        let response = self.transport.send(message).await?;
        tracing::debug!(
            host = %self.host,
            code = %response.code(),
            message_id = %message_id,
            "SMTP server accepted message"
        );
        Ok(message_id)
    }

    async fn test_connection(&self) -> Result<bool, MailerError> {
        Ok(self.transport.test_connection().await?)
    }
}

pub struct SmtpTransportBuilder {
    hostname: String,
    port: Option<u16>,
    credentials: Option<Credentials>,
    tls: TlsConfig,
}

#[derive(Debug, Clone, Copy)]
pub enum TlsConfig {
    None,
    StartTls,
    Tls,
}

impl SmtpTransportBuilder {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            port: None,
            credentials: None,
            tls: TlsConfig::StartTls,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(username.to_string(), password.to_string()));
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn build(self) -> Result<SmtpTransport, MailerError> {
        let mut builder = match self.tls {
            TlsConfig::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.hostname)
            }
            TlsConfig::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.hostname)?
            }
            TlsConfig::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.hostname)?,
        };

        if let Some(port) = self.port {
            builder = builder.port(port);
        }

        if let Some(credentials) = self.credentials {
            builder = builder.credentials(credentials);
        }

        Ok(SmtpTransport {
            transport: builder.build(),
            host: self.hostname,
        })
    }
}

fn generate_message_id(from: &str) -> String {
    let domain = from
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim_end_matches('>').trim())
        .filter(|domain| !domain.is_empty())
        .unwrap_or("localhost");
    format!("<{}@{}>", uuid::Uuid::new_v4(), domain)
}

fn build_message(email: &Email, message_id: &str) -> Result<Message, MailerError> {
    let mut message_builder = Message::builder()
        .from(email.from.parse()?)
        .subject(email.subject.as_str())
        .message_id(Some(message_id.to_string()));

    for to in &email.to {
        message_builder = message_builder.to(to.parse()?);
    }

    let message = match (&email.html_body, &email.text_body) {
        (Some(html), Some(text)) => message_builder.multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::plain(text.clone()))
                .singlepart(SinglePart::html(html.clone())),
        )?,
        (Some(html), None) => message_builder.singlepart(SinglePart::html(html.clone()))?,
        (None, Some(text)) => message_builder.singlepart(SinglePart::plain(text.clone()))?,
        (None, None) => {
            return Err(MailerError::Builder("No email body provided".to_string()));
        }
    };

    Ok(message)
}
