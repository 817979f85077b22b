//! # LMS Axum Integration
//!
//! Axum routes and JWT middleware exposing LMS email delivery over HTTP.
//!
//! Every email route requires an access token, read from the `access_token` cookie or an
//! `Authorization: Bearer` header. The check runs before the request body is parsed, so
//! unauthenticated callers never reach template rendering or SMTP.
//!
//! | Route                              | Access |
//! | ---------------------------------- | ------ |
//! | `POST /api/v1/send-template-email` | user   |
//! | `POST /api/v1/send-email`          | user   |
//! | `POST /api/v1/test-email-config`   | admin  |
//! | `GET  /api/v1/health`              | public |
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lms_axum::{AuthConfig, routes};
//! use lms_mailer::{DeliveryConfig, DeliveryOrchestrator};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Arc::new(DeliveryOrchestrator::smtp(DeliveryConfig::from_env()?));
//! let app: axum::Router = routes(orchestrator, AuthConfig::new("jwt-secret")).build();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod extractors;
mod middleware;
mod routes;
mod types;
mod validation;

pub use error::{ApiError, Result};
pub use extractors::{AdminUser, AuthUser, JsonBody};
pub use middleware::{EmailState, require_auth};
pub use routes::create_router;
pub use types::{
    AuthConfig, Claims, DeliveryResponse, HealthResponse, MessageResponse, SendEmailRequest,
    TemplateEmailRequest, TestEmailConfigRequest,
};

use axum::Router;
use lms_mailer::{AskamaTemplateEngine, DeliveryOrchestrator, TemplateContext, TemplateEngine};
use std::sync::Arc;

/// Create the email routes, ready to be served or merged into a larger application.
///
/// Templates are rendered with the built-in engine using the orchestrator's `app_name` and
/// `frontend_url` unless another engine is supplied.
pub fn routes(orchestrator: Arc<DeliveryOrchestrator>, auth: AuthConfig) -> EmailRouterBuilder {
    EmailRouterBuilder {
        orchestrator,
        auth,
        engine: None,
    }
}

/// Builder for configuring the email routes
pub struct EmailRouterBuilder {
    orchestrator: Arc<DeliveryOrchestrator>,
    auth: AuthConfig,
    engine: Option<Arc<dyn TemplateEngine>>,
}

impl EmailRouterBuilder {
    /// Use a custom template engine
    pub fn with_template_engine(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Build the router with the configured options
    pub fn build(self) -> Router {
        let engine = self.engine.unwrap_or_else(|| {
            let config = self.orchestrator.config();
            Arc::new(AskamaTemplateEngine::new(TemplateContext {
                app_name: config.app_name.clone(),
                frontend_url: config.frontend_url.clone(),
            }))
        });

        create_router(EmailState {
            orchestrator: self.orchestrator,
            engine,
            auth: Arc::new(self.auth),
        })
    }
}

impl From<EmailRouterBuilder> for Router {
    fn from(builder: EmailRouterBuilder) -> Self {
        builder.build()
    }
}
