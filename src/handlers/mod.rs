pub mod auth_otp;
pub mod devices;
pub mod stepup;
