use axum::{routing::post, Router};

use crate::{
    handlers::{auth_otp, stepup},
    state::AppState,
};

/// Flows reachable without a bearer token. `request`/`verify` still accept
/// one (some purposes require it); the extractor sorts that out per call.
pub fn auth_otp_routes() -> Router<AppState> {
    Router::new()
        // Request a code
        .route("/auth/otp/request", post(auth_otp::request_otp))

        // Exchange a code for a verification token
        .route("/auth/otp/verify", post(auth_otp::verify_otp))

        // Create an account with a verified email
        .route("/auth/register", post(stepup::register_with_otp))

        // Reset a forgotten password
        .route("/auth/reset-password", post(stepup::reset_password_with_otp))
}
