use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{confirm_reschedule, declare_emergency_leave};

pub fn emergency_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/leave", post(declare_emergency_leave))
        .route(
            "/reschedule/{appointment_id}/confirm",
            post(confirm_reschedule),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
