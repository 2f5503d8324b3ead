use std::sync::Arc;

use axum::{routing::get, Router};

use booking_cell::router::{appointment_routes, booking_routes};
use cascade_cell::router::emergency_routes;
use schedule_cell::router::schedule_routes;
use shared_config::AppConfig;
use waittime_cell::router::waittime_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Scheduling API is running!" }))
        .nest("/schedule", schedule_routes(state.clone()))
        .nest("/bookings", booking_routes(state.clone()))
        .nest(
            "/appointments",
            appointment_routes(state.clone()).merge(waittime_routes(state.clone())),
        )
        .nest("/doctor/emergency", emergency_routes(state))
}
