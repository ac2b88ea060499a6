use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use crate::models::purpose::OtpPurpose;

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct RequestOtpRequest {
    /// Required unless the purpose derives the email from the caller.
    #[validate(email(message = "Malformed email address"))]
    pub email: Option<String>,
    pub purpose: OtpPurpose,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Malformed email address"))]
    pub email: Option<String>,
    pub purpose: OtpPurpose,
    #[validate(length(min = 6, max = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Malformed email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    pub verification_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Malformed email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
    pub verification_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
    pub verification_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteEmailVerificationRequest {
    pub verification_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangeEmailRequest {
    #[validate(email(message = "Malformed email address"))]
    pub new_email: String,
    pub verification_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordDeviceRequest {
    pub device_id: Option<String>,
    pub platform: Option<String>,
    pub model: Option<String>,
    pub app_version: Option<String>,
    pub locale: Option<String>,
    pub push_token: Option<String>,
}

// Response DTOs

#[derive(Debug, Serialize)]
pub struct RequestOtpResponse {
    pub success: bool,
    pub cooldown_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct VerifyOtpResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_left: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub account_id: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ChangeEmailResponse {
    pub success: bool,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RecordDeviceResponse {
    pub success: bool,
    pub is_new_device: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_passwords_fail_validation() {
        let req = ResetPasswordRequest {
            email: "a@x.com".to_string(),
            new_password: "short7!".to_string(),
            verification_token: "t".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn eight_char_password_passes() {
        let req = ResetPasswordRequest {
            email: "a@x.com".to_string(),
            new_password: "Str0ngPass1".to_string(),
            verification_token: "t".to_string(),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn code_length_is_enforced() {
        let mut req = VerifyOtpRequest {
            email: Some("a@x.com".to_string()),
            purpose: OtpPurpose::ResetPassword,
            code: "12345".to_string(),
        };
        assert!(req.validate().is_err());
        req.code = "123456".to_string();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn missing_email_is_fine_at_the_dto_layer() {
        // Purposes that derive the email from the caller pass no email;
        // the handler enforces presence per purpose
        let req = RequestOtpRequest {
            email: None,
            purpose: OtpPurpose::ChangePassword,
            metadata: HashMap::new(),
        };
        assert!(req.validate().is_ok());
    }
}
