//! `api` crate: HTTP REST API layer.
//!
//! Exposes, under `/api`:
//!   GET    /workflows
//!   POST   /workflows
//!   GET    /workflows/:id
//!   PATCH  /workflows/:id
//!   DELETE /workflows/:id
//!   GET    /workflows/:id/validate
//!   POST   /workflows/:id/steps
//!   PATCH  /workflows/:id/steps/:step_id
//!   DELETE /workflows/:id/steps/:step_id
//!   DELETE /workflows/:id/edges/:edge_id
//!   POST   /runs/workflows/:id/run
//!   GET    /runs
//!   GET    /runs/:run_id
//!   GET    /health
//!
//! Every route but `/health` requires the `X-Browser-ID` header.

pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod state;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use handlers::{health, runs, steps, workflows};

pub use error::ApiError;
pub use state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/workflows", get(workflows::list).post(workflows::create))
        .route(
            "/workflows/:id",
            get(workflows::get).patch(workflows::update).delete(workflows::delete),
        )
        .route("/workflows/:id/validate", get(workflows::validate))
        .route("/workflows/:id/steps", post(steps::add))
        .route(
            "/workflows/:id/steps/:step_id",
            patch(steps::update).delete(steps::delete),
        )
        .route("/workflows/:id/edges/:edge_id", delete(steps::delete_edge))
        .route("/runs", get(runs::list))
        .route("/runs/:run_id", get(runs::get))
        .route("/runs/workflows/:id/run", post(runs::submit))
        .route("/health", get(health::health));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
