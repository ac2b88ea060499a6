pub mod audit;
pub mod device;
pub mod otp_request;
pub mod otp_session;
pub mod purpose;
pub mod user;
