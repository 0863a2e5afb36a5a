use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/version", get(handlers::get_version))
        // On-demand
        .route("/on-demand", post(handlers::trigger_on_demand))
        .route("/on-demand", get(handlers::list_pending))
        // Cache reads
        .route("/cache/{namespace}", get(handlers::list_cache))
        .route("/cache/{namespace}/{id}", get(handlers::get_cache));

    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
