use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{
    cancel_appointment, check_in, confirm_booking, create_direct_booking, create_hold,
    end_consultation, get_appointment, purge_expired_holds, reschedule_appointment,
    start_consultation,
};

/// Patient-facing booking flow: hold a slot, then confirm it.
pub fn booking_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/hold", post(create_hold))
        .route("/confirm", post(confirm_booking))
        .route("/direct", post(create_direct_booking))
        .route("/holds/purge", post(purge_expired_holds))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

/// Lifecycle operations on existing appointments. Merged with the wait-time
/// routes under `/appointments` by the API shell.
pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/{appointment_id}", get(get_appointment))
        .route("/{appointment_id}/check-in", post(check_in))
        .route("/{appointment_id}/start", post(start_consultation))
        .route("/{appointment_id}/end", post(end_consultation))
        .route("/{appointment_id}/cancel", post(cancel_appointment))
        .route("/{appointment_id}/reschedule", post(reschedule_appointment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
