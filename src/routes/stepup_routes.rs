use axum::{middleware, routing::post, Router};

use crate::{
    handlers::{devices, stepup},
    middleware::auth::auth_middleware,
    state::AppState,
};

/// Step-up routes that only make sense for an authenticated caller; the
/// middleware puts verified Claims into request extensions.
pub fn stepup_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/change-password", post(stepup::change_password_with_otp))
        .route("/auth/verify-email", post(stepup::complete_email_verification_with_otp))
        .route("/auth/change-email", post(stepup::change_email_with_otp))
        .route("/auth/devices", post(devices::record_login_device))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
