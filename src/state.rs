use mongodb::Database;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::services::audit_service::AuditService;
use crate::services::device_service::DeviceService;
use crate::services::email_service::EmailService;
use crate::services::hash_engine::HashEngine;
use crate::services::identity_service::IdentityService;
use crate::services::otp_service::OtpService;
use crate::services::session_service::SessionService;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub jwt_secret: String,
    pub otp_service: OtpService,
    pub session_service: SessionService,
    pub device_service: DeviceService,
    pub identity_service: IdentityService,
    pub email_service: EmailService,
    pub audit: AuditService,
}

impl AppState {
    pub fn new(db: Database, config: &AppConfig) -> Result<Self> {
        // Fails fast when the pepper is absent or blank
        let hash = HashEngine::new(config.otp_pepper.clone())?;

        Ok(AppState {
            otp_service: OtpService::new(&db, hash.clone()),
            session_service: SessionService::new(&db, hash.clone()),
            device_service: DeviceService::new(&db, hash.clone()),
            identity_service: IdentityService::new(&db),
            email_service: EmailService::new(
                config.email_api_url.clone(),
                config.email_api_key.clone(),
                config.email_from.clone(),
            ),
            audit: AuditService::new(&db, hash),
            jwt_secret: config.jwt_secret.clone(),
            db,
        })
    }
}
