use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{get_wait_estimate, recompute_overruns};

/// Mounted under `/appointments` alongside the lifecycle routes.
pub fn waittime_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/{appointment_id}/waittime", get(get_wait_estimate))
        .route("/overruns/{doctor_id}/recompute", post(recompute_overruns))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
