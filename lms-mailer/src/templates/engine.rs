use crate::error::TemplateError;
use crate::templates::{
    ActivationTemplate, EnrollmentTemplate, GenericTemplate, PasswordResetTemplate,
    RenderedEmail, TemplateContext, TemplateData, TemplateKind,
};
use askama::Template;
use regex::Regex;
use std::sync::LazyLock;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid tag regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("Invalid whitespace regex"));
static HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<head>.*?</head>").expect("Invalid head regex"));

pub trait TemplateEngine: Send + Sync {
    fn render(&self, kind: TemplateKind, data: &TemplateData)
    -> Result<RenderedEmail, TemplateError>;

    /// Renders a template selected by its wire name (`ACTIVATION`, `PASSWORD_RESET`, ...).
    fn render_named(&self, name: &str, data: &TemplateData) -> Result<RenderedEmail, TemplateError> {
        let kind: TemplateKind = name.parse()?;
        self.render(kind, data)
    }
}

/// Renders the built-in compiled templates.
#[derive(Debug, Clone, Default)]
pub struct AskamaTemplateEngine {
    context: TemplateContext,
}

impl AskamaTemplateEngine {
    pub fn new(context: TemplateContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &TemplateContext {
        &self.context
    }
}

impl TemplateEngine for AskamaTemplateEngine {
    fn render(
        &self,
        kind: TemplateKind,
        data: &TemplateData,
    ) -> Result<RenderedEmail, TemplateError> {
        let (subject, html) = match kind {
            TemplateKind::Activation => {
                let template = ActivationTemplate::from_data(data, &self.context)?;
                (template.subject(), template.render()?)
            }
            TemplateKind::PasswordReset => {
                let template = PasswordResetTemplate::from_data(data, &self.context)?;
                (template.subject(), template.render()?)
            }
            TemplateKind::Enrollment => {
                let template = EnrollmentTemplate::from_data(data, &self.context)?;
                (template.subject(), template.render()?)
            }
            TemplateKind::Generic => {
                let template = GenericTemplate::from_data(data, &self.context)?;
                (template.subject(), template.render()?)
            }
        };

        tracing::debug!(template = %kind, "Rendered email template");
        Ok(RenderedEmail { subject, html })
    }
}

/// Basic HTML to text conversion for the plain-text alternative part.
pub fn html_to_text(html: &str) -> String {
    let text = HEAD.replace_all(html, "");
    let text = text
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n\n")
        .replace("</div>", "\n")
        .replace("</a>", "\n")
        .replace("</h1>", "\n\n")
        .replace("</h2>", "\n\n")
        .replace("</h3>", "\n\n");

    let text = TAG.replace_all(&text, "");
    let text = BLANK_LINES.replace_all(&text, "\n\n");

    let text = text
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&amp;", "&");

    text.trim().to_string()
}
