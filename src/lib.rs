//! # SmartNego - negotiation workflow server
//!
//! SmartNego lets a buyer haggle over an item's price with an AI agent acting
//! for the seller. Every AI reply is stored as an unapproved *draft*; the
//! seller approves it, rejects it, or asks for a revision with an
//! instruction. Approving a draft that carries a suggested price changes the
//! item's price in the same atomic step.
//!
//! ## Features
//!
//! - **Draft lifecycle**: at most one live draft per item, explicit
//!   `superseded` state, racing transitions resolved per item
//! - **Agents**: rule-based concession strategy or an LLM (OpenAI,
//!   Anthropic, Ollama) behind a timeout and bounded retry
//! - **Storage**: in-memory or SQLite / PostgreSQL / MySQL via sqlx
//! - **Authentication**: trusted identity header or JWT bearer token
//! - **Metrics**: Prometheus metrics for monitoring
//! - **Health Checks**: Kubernetes-ready health endpoints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smartnego::config::Settings;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::new()?;
//!     let (engine, metrics) = smartnego::build_engine(&settings).await?;
//!     let app = smartnego::create_app(engine, metrics, &settings);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Domain**: items, messages, draft states, errors
//! - **Negotiation**: the engine and its per-item critical sections
//! - **Agents**: the opaque proposal capability
//! - **Persistence**: the conversation store
//! - **Adapters**: HTTP handlers, middleware, metrics
//! - **Config**: configuration management

pub mod adapters;
pub mod agents;
pub mod cli;
pub mod config;
pub mod domain;
pub mod negotiation;
pub mod persistence;

use crate::adapters::api_handler::{self, ApiState};
use crate::adapters::auth_middleware::{auth_middleware, AuthMiddleware, SharedAuthMiddleware};
use crate::adapters::health_handler::HealthHandler;
use crate::adapters::metrics_handler::{track_requests, MetricsCollector, MetricsHandler};
use crate::config::Settings;
use crate::negotiation::NegotiationEngine;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Wire the store, the agent and metrics into a ready engine
pub async fn build_engine(
    settings: &Settings,
) -> anyhow::Result<(Arc<NegotiationEngine>, Arc<MetricsCollector>)> {
    let store = persistence::create_store(&settings.persistence).await?;
    let agent = agents::create_agent(&settings.agent)?;
    let metrics = Arc::new(MetricsCollector::new()?);

    let engine = NegotiationEngine::new(store, agent, settings.negotiation.clone())
        .with_metrics(metrics.clone());
    Ok((Arc::new(engine), metrics))
}

/// Creates the Axum application router with all endpoints configured.
///
/// Health and metrics endpoints are public; everything under `/api`
/// requires an authenticated actor.
pub fn create_app(
    engine: Arc<NegotiationEngine>,
    metrics: Arc<MetricsCollector>,
    settings: &Settings,
) -> Router {
    let health_handler = Arc::new(HealthHandler::new(engine.clone()));
    let metrics_handler = Arc::new(MetricsHandler::new(metrics.clone()));

    let public_router = Router::new()
        .route("/health", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.health().await }
            }
        }))
        .route("/health/ready", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.ready().await }
            }
        }))
        .route("/health/live", get({
            let handler = health_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.live().await }
            }
        }))
        .route("/metrics", get({
            let handler = metrics_handler.clone();
            move || {
                let h = handler.clone();
                async move { h.metrics().await }
            }
        }));

    let api_state = ApiState { engine };

    let mut api_router = Router::new()
        .route("/items", post(api_handler::register_item))
        .route("/items/:id/view", get(api_handler::get_view))
        .route(
            "/items/:id/messages",
            get(api_handler::list_messages).post(api_handler::append_message),
        )
        .route("/items/:id/retry", post(api_handler::retry_draft))
        .route("/items/:id/price", put(api_handler::update_price))
        .route("/items/:id/negotiation", put(api_handler::update_negotiation))
        .route("/items/:id/buy", put(api_handler::purchase_item))
        .route("/messages/:id/approve", put(api_handler::approve_message))
        .route("/messages/:id/reject", put(api_handler::reject_message))
        .with_state(api_state)
        .route_layer(axum::middleware::from_fn_with_state(metrics, track_requests));

    let auth: SharedAuthMiddleware = Arc::new(AuthMiddleware::new(Arc::new(settings.auth.clone())));
    api_router = api_router.layer(axum::middleware::from_fn_with_state(auth, auth_middleware));

    if let Some(rate_limit) = settings.rate_limit.as_ref().filter(|rl| rl.enabled) {
        let limiter = crate::adapters::rate_limit::create_limiter(
            rate_limit.requests_per_second,
            rate_limit.burst_size,
        );
        api_router = api_router.layer(axum::middleware::from_fn_with_state(
            limiter,
            crate::adapters::rate_limit::rate_limit_middleware,
        ));
    }

    public_router
        .nest("/api", api_router)
        .layer(TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}
