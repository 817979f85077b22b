use crate::error::TemplateError;
use crate::templates::TemplateData;
use askama::Template;
use regex::Regex;
use std::sync::LazyLock;

/// Tokens end up inside `href` attributes unescaped, so they are restricted to the
/// URL-safe alphabet used by signed tokens (base64url plus the JWT separator).
static LINK_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._~-]+$").expect("Invalid link token pattern"));

#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub app_name: String,
    pub frontend_url: String,
}

impl Default for TemplateContext {
    fn default() -> Self {
        Self {
            app_name: "LMS".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
        }
    }
}

fn link_token(field: &'static str, data: &TemplateData) -> Result<String, TemplateError> {
    let token = data.require(field)?;
    if LINK_TOKEN.is_match(&token) {
        Ok(token)
    } else {
        Err(TemplateError::InvalidField {
            field,
            reason: "must contain only URL-safe characters".to_string(),
        })
    }
}

#[derive(Template)]
#[template(
    source = r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Activate Your Account - {{ app_name }}</title>
</head>
<body style="font-family: Arial, sans-serif; background-color: #f4f4f4; margin: 0; padding: 20px;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #e0e0e0; border-radius: 5px; background: white;">
        <h2 style="color: #333;">Welcome to {{ app_name }}!</h2>
        <p>Thank you for registering. Please click the button below to activate your account:</p>
        <a href="{{ activation_link|safe }}" style="display: inline-block; background-color: #4CAF50; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px; margin: 20px 0;">Activate Account</a>
        <p>Or copy and paste this activation link in your browser:</p>
        <p style="word-break: break-all; font-family: monospace;">{{ activation_link|safe }}</p>
        <p>This link will expire in 24 hours.</p>
        <p>If you did not register for an account, please ignore this email.</p>
    </div>
</body>
</html>
"#,
    ext = "html"
)]
pub struct ActivationTemplate {
    pub app_name: String,
    pub activation_link: String,
}

impl ActivationTemplate {
    pub fn from_data(data: &TemplateData, context: &TemplateContext) -> Result<Self, TemplateError> {
        let token = link_token("activationToken", data)?;

        Ok(Self {
            app_name: context.app_name.clone(),
            activation_link: format!("{}/activate-account?token={token}", context.frontend_url),
        })
    }

    pub fn subject(&self) -> String {
        format!("Activate Your {} Account", self.app_name)
    }
}

#[derive(Template)]
#[template(
    source = r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Reset Your Password - {{ app_name }}</title>
</head>
<body style="font-family: Arial, sans-serif; background-color: #f4f4f4; margin: 0; padding: 20px;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #e0e0e0; border-radius: 5px; background: white;">
        <h2 style="color: #333;">Password Reset Request</h2>
        <p>We received a request to reset your password. Please click the button below to create a new password:</p>
        <a href="{{ reset_link|safe }}" style="display: inline-block; background-color: #2196F3; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px; margin: 20px 0;">Reset Password</a>
        <p>Or copy and paste this reset link in your browser:</p>
        <p style="word-break: break-all; font-family: monospace;">{{ reset_link|safe }}</p>
        <p>This link will expire in 1 hour.</p>
        <p>If you did not request a password reset, please ignore this email. Your password will not be changed.</p>
    </div>
</body>
</html>
"#,
    ext = "html"
)]
pub struct PasswordResetTemplate {
    pub app_name: String,
    pub reset_link: String,
}

impl PasswordResetTemplate {
    pub fn from_data(data: &TemplateData, context: &TemplateContext) -> Result<Self, TemplateError> {
        let token = link_token("resetToken", data)?;

        Ok(Self {
            app_name: context.app_name.clone(),
            reset_link: format!("{}/reset-password?token={token}", context.frontend_url),
        })
    }

    pub fn subject(&self) -> String {
        format!("Reset Your {} Password", self.app_name)
    }
}

/// Course name and order number are HTML-escaped in the body (`C & C++` becomes
/// `C &amp; C++`); the subject and the plain-text part carry them unchanged.
#[derive(Template)]
#[template(
    source = r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Enrollment Confirmation - {{ app_name }}</title>
</head>
<body style="font-family: Arial, sans-serif; background-color: #f4f4f4; margin: 0; padding: 20px;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #e0e0e0; border-radius: 5px; background: white;">
        <h2 style="color: #333;">Course Enrollment Confirmation</h2>
        <p>Thank you for enrolling in <strong>{{ course_name }}</strong>!</p>
        <p>Your order number is: <strong>{{ order_number }}</strong></p>
        <p>You can now access your course materials by logging into your account and navigating to "My Courses".</p>
        <a href="{{ courses_link|safe }}" style="display: inline-block; background-color: #FF5722; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px; margin: 20px 0;">Start Learning</a>
        <p>If you have any questions, please contact our support team.</p>
    </div>
</body>
</html>
"#,
    ext = "html"
)]
pub struct EnrollmentTemplate {
    pub app_name: String,
    pub course_name: String,
    pub order_number: String,
    pub courses_link: String,
}

impl EnrollmentTemplate {
    pub fn from_data(data: &TemplateData, context: &TemplateContext) -> Result<Self, TemplateError> {
        Ok(Self {
            app_name: context.app_name.clone(),
            course_name: data.require("courseName")?,
            order_number: data.require("orderNumber")?,
            courses_link: format!("{}/my-courses", context.frontend_url),
        })
    }

    pub fn subject(&self) -> String {
        format!("Enrollment Confirmation: {}", self.course_name)
    }
}

/// Free-form message. The body is caller-supplied HTML and is embedded as-is; the subject is
/// HTML-escaped where it appears in the body.
#[derive(Template)]
#[template(
    source = r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{ subject }} - {{ app_name }}</title>
</head>
<body style="font-family: Arial, sans-serif; background-color: #f4f4f4; margin: 0; padding: 20px;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #e0e0e0; border-radius: 5px; background: white;">
        <h2 style="color: #333;">{{ subject }}</h2>
        <div>{{ body|safe }}</div>
    </div>
</body>
</html>
"#,
    ext = "html"
)]
pub struct GenericTemplate {
    pub app_name: String,
    pub subject: String,
    pub body: String,
}

impl GenericTemplate {
    pub fn from_data(data: &TemplateData, context: &TemplateContext) -> Result<Self, TemplateError> {
        Ok(Self {
            app_name: context.app_name.clone(),
            subject: data.require("subject")?,
            body: data.require("body")?,
        })
    }

    pub fn subject(&self) -> String {
        self.subject.clone()
    }
}
