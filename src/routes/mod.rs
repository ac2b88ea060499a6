pub mod auth_otp_routes;
pub mod stepup_routes;
