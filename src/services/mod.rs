pub mod audit_service;
pub mod device_service;
pub mod email_service;
pub mod hash_engine;
pub mod identity_service;
pub mod otp_service;
pub mod session_service;
