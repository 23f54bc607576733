use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    // The browser UI is served from a different origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Collaborator proxies
        .route("/api/session", get(handlers::issue_session))
        .route("/api/transcribe", post(handlers::transcribe))
        .route("/api/chat", post(handlers::chat))
        .route("/api/generate-suggestion", post(handlers::generate_suggestion))
        .route("/api/responses", post(handlers::responses))
        .route(
            "/api/elevenlabs",
            get(handlers::list_voices).post(handlers::synthesize),
        )
        // Session bookkeeping
        .route(
            "/api/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route("/api/sessions/{id}", get(handlers::get_session))
        .route(
            "/api/sessions/{id}/messages",
            post(handlers::add_session_message),
        )
        .route(
            "/api/sessions/{id}/complete",
            post(handlers::complete_session),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
