//! HTTP API server for the Quarex answer service.

// Allow clippy lint triggered by utoipa's OpenApi derive macro
#![allow(clippy::needless_for_each)]

mod ask;
mod error;
mod guard;
mod params;

use std::net::SocketAddr;
use std::sync::Arc;

use answer_core::providers::{anthropic, gemini};
use answer_core::{AnswerMode, AnswerProvider, AnswerResult, CitationResolver};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::build_info;
use crate::config::Config;
use crate::core::security::Security;

pub use ask::{CitationItem, CitationRequest, CitationResponse};
pub use error::ApiError;
pub use params::{AskRequest, Loose};

/// Shared application state.
pub struct AppState {
    /// Claude provider (if a key is configured).
    pub claude: Option<Arc<dyn AnswerProvider>>,

    /// Gemini provider (if a key is configured).
    pub gemini: Option<Arc<dyn AnswerProvider>>,

    pub claude_model: String,
    pub gemini_model: String,

    /// Titles citation links.
    pub resolver: CitationResolver,

    /// Origin allowlist, rate limit, content filter and audit log.
    pub security: Security,
}

impl AppState {
    /// State with no providers configured.
    #[must_use]
    pub fn new(security: Security, resolver: CitationResolver) -> Self {
        Self {
            claude: None,
            gemini: None,
            claude_model: anthropic::DEFAULT_MODEL.to_string(),
            gemini_model: gemini::DEFAULT_MODEL.to_string(),
            resolver,
            security,
        }
    }

    #[must_use]
    pub fn with_claude(mut self, provider: Arc<dyn AnswerProvider>, model: impl Into<String>) -> Self {
        self.claude = Some(provider);
        self.claude_model = model.into();
        self
    }

    #[must_use]
    pub fn with_gemini(mut self, provider: Arc<dyn AnswerProvider>, model: impl Into<String>) -> Self {
        self.gemini = Some(provider);
        self.gemini_model = model.into();
        self
    }

    /// Build state from configuration. Providers without a key are left
    /// out and their endpoints answer 503.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built or a state
    /// directory cannot be determined.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut state = Self::new(config.security.build()?, CitationResolver::new()?);

        match config.claude_provider()? {
            Some(provider) => state = state.with_claude(Arc::new(provider), &config.claude.model),
            None => tracing::warn!("ANTHROPIC_API_KEY not set, /api/ask-claude disabled"),
        }
        match config.gemini_provider()? {
            Some(provider) => state = state.with_gemini(Arc::new(provider), &config.gemini.model),
            None => tracing::warn!("GEMINI_API_KEY not set, /api/ask disabled"),
        }

        Ok(state)
    }
}

pub type SharedState = Arc<AppState>;

/// `OpenAPI` documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Quarex API",
        description = "Streaming answers with web citations",
        version = "0.1.0",
        license(name = "MIT")
    ),
    paths(health, ask::ask_claude, ask::ask_gemini, ask::citation),
    components(schemas(
        AnswerResult,
        AnswerMode,
        AskRequest,
        Loose,
        CitationRequest,
        CitationResponse,
        CitationItem
    ))
)]
struct ApiDoc;

/// Build the application router.
pub fn router(state: SharedState) -> Router {
    let guarded = Router::new()
        .route(
            "/api/ask-claude",
            get(ask::ask_claude)
                .post(ask::ask_claude)
                .options(guard::preflight),
        )
        .route(
            "/api/ask",
            get(ask::ask_gemini)
                .post(ask::ask_gemini)
                .options(guard::preflight),
        )
        .route(
            "/api/citation",
            post(ask::citation).options(guard::preflight),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard::origin_guard,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()));

    Router::new()
        .merge(guarded)
        .merge(public)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP API server.
///
/// # Errors
///
/// Returns an error if the state cannot be built or the server fails to
/// bind or start.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let state: SharedState = Arc::new(AppState::from_config(config)?);
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, version = build_info::LONG_VERSION, "starting HTTP API server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service healthy", body = String))
)]
async fn health() -> &'static str {
    "ok"
}
