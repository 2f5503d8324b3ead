// libs/schedule-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn schedule_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::get_schedule))
        .route("/blocks", post(handlers::create_schedule_block))
        .route("/blocks/{block_id}", put(handlers::update_schedule_block))
        .route("/blocks/{block_id}", delete(handlers::delete_schedule_block))
        .route("/slots", get(handlers::list_bookable_slots))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
