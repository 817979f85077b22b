use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use lms_mailer::{Email, Provider, TemplateData};
use serde_json::json;

use crate::{
    error::{ApiError, Result},
    extractors::{AdminUser, AuthUser, JsonBody},
    middleware::{EmailState, require_auth},
    types::*,
    validation::{non_blank, require_email},
};

pub fn create_router(state: EmailState) -> Router {
    let public_routes = Router::new().route("/health", get(health_handler));

    // route_layer runs the auth check before the handlers extract the body
    let protected_routes = Router::new()
        .route("/send-template-email", post(send_template_email_handler))
        .route("/send-email", post(send_email_handler))
        .route("/test-email-config", post(test_email_config_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let api = Router::new().merge(public_routes).merge(protected_routes);

    Router::new().nest("/api/v1", api).with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn send_template_email_handler(
    State(state): State<EmailState>,
    AuthUser(claims): AuthUser,
    JsonBody(request): JsonBody<TemplateEmailRequest>,
) -> Result<Response> {
    let recipient = require_email(request.email.as_deref(), "Email address is required")?;
    let email_type = non_blank(request.email_type.as_deref())
        .ok_or_else(|| ApiError::BadRequest("Invalid email type".to_string()))?;

    let data = TemplateData::from(request.payload);
    let rendered = state.engine.render_named(email_type, &data)?;

    tracing::debug!(user_id = %claims.id, email_type, to = %recipient, "Template email requested");

    let outcome = state
        .orchestrator
        .deliver(&recipient, &rendered.subject, &rendered.html)
        .await;

    if outcome.success {
        return Ok(Json(DeliveryResponse::from(outcome)).into_response());
    }
    if outcome.is_rejected() {
        return Err(ApiError::BadRequest(outcome.error.unwrap_or_default()));
    }

    let error = outcome
        .error
        .unwrap_or_else(|| "Failed to send email".to_string());
    Ok((
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": error })),
    )
        .into_response())
}

async fn send_email_handler(
    State(state): State<EmailState>,
    AuthUser(claims): AuthUser,
    JsonBody(request): JsonBody<SendEmailRequest>,
) -> Result<Json<MessageResponse>> {
    let missing = || ApiError::BadRequest("Missing required fields".to_string());

    let to = non_blank(request.to.as_deref()).ok_or_else(missing)?;
    let subject = non_blank(request.subject.as_deref()).ok_or_else(missing)?;
    let html = non_blank(request.html.as_deref());
    let text = non_blank(request.text.as_deref());
    if html.is_none() && text.is_none() {
        return Err(missing());
    }
    let to = require_email(Some(to), "Missing required fields")?;

    let mut builder = Email::builder()
        .from(state.orchestrator.config().get_from_address())
        .to(to.as_str())
        .subject(subject);
    if let Some(html) = html {
        builder = builder.html_body(html);
    }
    if let Some(text) = text {
        builder = builder.text_body(text);
    }
    let email = builder
        .build()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::debug!(user_id = %claims.id, to = %to, "Free-form email requested");

    let outcome = state.orchestrator.deliver_email(&email).await;
    if outcome.is_rejected() {
        return Err(ApiError::BadRequest(outcome.error.unwrap_or_default()));
    }
    if !outcome.success {
        let error = outcome.error.unwrap_or_default();
        return Err(ApiError::Delivery(format!("Error sending email: {error}")));
    }

    Ok(Json(MessageResponse {
        success: true,
        message: "Email sent successfully".to_string(),
        message_id: outcome.message_id,
    }))
}

async fn test_email_config_handler(
    State(state): State<EmailState>,
    AdminUser(claims): AdminUser,
    JsonBody(request): JsonBody<TestEmailConfigRequest>,
) -> Result<Json<MessageResponse>> {
    let recipient = require_email(request.email.as_deref(), "Email address is required")?;

    tracing::info!(user_id = %claims.id, to = %recipient, "Sending email configuration test");

    // Connection check against the primary provider before anything is sent
    match state.orchestrator.verify_provider(Provider::Primary).await {
        Ok(true) => {}
        Ok(false) => {
            return Err(ApiError::Delivery(
                "Error sending test email: primary SMTP connection check failed".to_string(),
            ));
        }
        Err(e) => {
            return Err(ApiError::Delivery(format!("Error sending test email: {e}")));
        }
    }

    let outcome = state.orchestrator.send_test_message(&recipient).await;
    if !outcome.success {
        let error = outcome.error.unwrap_or_default();
        return Err(ApiError::Delivery(format!(
            "Error sending test email: {error}"
        )));
    }

    Ok(Json(MessageResponse {
        success: true,
        message: "Test email sent successfully".to_string(),
        message_id: outcome.message_id,
    }))
}
