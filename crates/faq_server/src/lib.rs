//! HTTP front door for the FAQ assistant.

pub mod config;
pub mod routes;

use axum::routing::{get, post};
use axum::Router;
use faq_core::Assistant;
use tower_http::trace::TraceLayer;

pub use config::ServerArgs;

#[derive(Clone)]
pub struct AppState {
    pub assistant: Assistant,
}

pub fn build_router(assistant: Assistant) -> Router {
    Router::new()
        .route("/ask", post(routes::ask))
        .route("/faqs", get(routes::faqs))
        .route("/health", get(routes::health))
        .with_state(AppState { assistant })
        .layer(TraceLayer::new_for_http())
}
