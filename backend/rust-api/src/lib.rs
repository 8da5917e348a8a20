use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{DuelError, StoreError};
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest(
            "/api/v1/duels",
            duel_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(middlewares::trace::trace_context_middleware))
                .layer(middleware::from_fn(middlewares::metrics::metrics_middleware))
                .layer(cors),
        )
}

fn duel_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::duels::create_duel))
        .route("/bot", post(handlers::duels::create_bot_duel))
        .route("/{id}", get(handlers::duels::get_duel))
        .route("/{id}/join", post(handlers::duels::join_duel))
        .route("/{id}/answers", post(handlers::duels::submit_answer))
        .route("/{id}/cancel", post(handlers::duels::cancel_duel))
        .route("/{id}/stream", get(handlers::sse::duel_stream))
}
