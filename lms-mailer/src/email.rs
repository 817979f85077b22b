use crate::MailerError;
use crate::templates::html_to_text;
use lettre::message::Mailbox;

/// An outbound message as handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
}

impl Email {
    pub fn builder() -> EmailBuilder {
        EmailBuilder::default()
    }

    pub fn validate(&self) -> Result<(), MailerError> {
        if self.to.is_empty() {
            return Err(MailerError::Builder(
                "At least one recipient is required".to_string(),
            ));
        }

        if self.to.iter().any(|to| to.trim().is_empty()) {
            return Err(MailerError::Builder(
                "Recipient address must not be empty".to_string(),
            ));
        }

        if self.from.is_empty() {
            return Err(MailerError::Builder("From address is required".to_string()));
        }

        // Addresses are checked here so that a bad one is rejected before any delivery attempt.
        for address in self.to.iter().chain(std::iter::once(&self.from)) {
            parse_mailbox(address)?;
        }

        if self.subject.is_empty() {
            return Err(MailerError::Builder("Subject is required".to_string()));
        }

        if self.html_body.is_none() && self.text_body.is_none() {
            return Err(MailerError::Builder(
                "Either HTML or text body is required".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parses `addr` or `Name <addr>` the way the SMTP transport will.
pub fn parse_mailbox(address: &str) -> Result<Mailbox, MailerError> {
    Ok(address.trim().parse::<Mailbox>()?)
}

#[derive(Debug, Default)]
pub struct EmailBuilder {
    to: Vec<String>,
    from: Option<String>,
    subject: Option<String>,
    html_body: Option<String>,
    text_body: Option<String>,
}

impl EmailBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to<S: Into<String>>(mut self, email: S) -> Self {
        self.to.push(email.into());
        self
    }

    pub fn from<S: Into<String>>(mut self, email: S) -> Self {
        self.from = Some(email.into());
        self
    }

    pub fn subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn html_body<S: Into<String>>(mut self, html: S) -> Self {
        self.html_body = Some(html.into());
        self
    }

    pub fn text_body<S: Into<String>>(mut self, text: S) -> Self {
        self.text_body = Some(text.into());
        self
    }

    /// Builds the message, filling in whichever body is missing.
    ///
    /// A text-only message gets `<p>text</p>` as its HTML part and an HTML-only message gets a
    /// tag-stripped text part, so recipients always receive a `multipart/alternative` body.
    pub fn build(self) -> Result<Email, MailerError> {
        let (html_body, text_body) = match (self.html_body, self.text_body) {
            (Some(html), Some(text)) => (Some(html), Some(text)),
            (Some(html), None) => {
                let text = html_to_text(&html);
                (Some(html), Some(text))
            }
            (None, Some(text)) => (Some(format!("<p>{text}</p>")), Some(text)),
            (None, None) => (None, None),
        };

        let email = Email {
            to: self.to,
            from: self
                .from
                .ok_or_else(|| MailerError::Builder("From address is required".to_string()))?,
            subject: self
                .subject
                .ok_or_else(|| MailerError::Builder("Subject is required".to_string()))?,
            html_body,
            text_body,
        };

        email.validate()?;
        Ok(email)
    }
}
