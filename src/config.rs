// config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: String,
    pub jwt_secret: String,
    /// Server-only secret mixed into every code/token hash. A leaked
    /// database alone must not be brute-forceable, so startup refuses to
    /// run without it.
    pub otp_pepper: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from: String,
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        AppConfig {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            database_name: env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "stepupdb".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            otp_pepper: env::var("OTP_PEPPER")
                .expect("OTP_PEPPER must be set (refusing to hash codes without a pepper)"),
            email_api_url: env::var("EMAIL_API_URL")
                .expect("EMAIL_API_URL must be set"),
            email_api_key: env::var("EMAIL_API_KEY")
                .expect("EMAIL_API_KEY must be set"),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "no-reply@stepup.app".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("PORT must be a number"),
            host: env::var("HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
        }
    }
}
