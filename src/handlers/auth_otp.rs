use axum::{extract::State, response::Json};
use std::collections::HashMap;
use validator::Validate;

use crate::dtos::auth_dtos::{
    RequestOtpRequest, RequestOtpResponse, VerifyOtpRequest, VerifyOtpResponse,
};
use crate::errors::{AppError, Result};
use crate::middleware::auth::CallerContext;
use crate::models::purpose::{EmailSource, OtpPurpose};
use crate::services::audit_service::AuditEvent;
use crate::services::identity_service::normalize_email;
use crate::services::otp_service::OtpVerification;
use crate::state::AppState;

/// Resolve the address a code binds to, per the purpose policy. Purposes
/// that require a caller take the email from the verified identity, never
/// from client input; CHANGE_EMAIL binds to the requested destination
/// mailbox instead.
fn binding_email(
    purpose: OtpPurpose,
    ctx: &CallerContext,
    client_email: Option<&str>,
    new_email: Option<&str>,
) -> Result<String> {
    let policy = purpose.policy();

    if policy.requires_caller && ctx.claims.is_none() {
        return Err(AppError::Unauthenticated);
    }

    if policy.needs_new_email {
        let new_email = new_email
            .ok_or_else(|| AppError::invalid("new_email is required for this purpose"))?;
        return normalize_email(new_email);
    }

    match policy.email_source {
        EmailSource::Caller => {
            // requires_caller was checked above
            let claims = ctx.claims.as_ref().ok_or(AppError::Unauthenticated)?;
            normalize_email(&claims.email)
        }
        EmailSource::Client => {
            let email = client_email.ok_or_else(|| AppError::invalid("email is required"))?;
            normalize_email(email)
        }
    }
}

// 1. Request OTP
pub async fn request_otp(
    State(state): State<AppState>,
    ctx: CallerContext,
    Json(req): Json<RequestOtpRequest>,
) -> Result<Json<RequestOtpResponse>> {
    req.validate()
        .map_err(|e| AppError::invalid(format!("Validation error: {}", e)))?;

    let purpose = req.purpose;
    let email = binding_email(
        purpose,
        &ctx,
        req.email.as_deref(),
        req.metadata.get("new_email").map(String::as_str),
    )?;
    let uid = ctx.claims.as_ref().map(|c| c.sub.clone());

    let issued = match state.otp_service.request_code(&email, purpose).await {
        Ok(issued) => issued,
        Err(err) => {
            let reason = match &err {
                AppError::ResourceExhausted { .. } => "locked",
                _ => "error",
            };
            state
                .audit
                .log(AuditEvent {
                    event: "otp_request",
                    purpose: Some(purpose),
                    email: &email,
                    uid: uid.as_deref(),
                    ip: ctx.ip.as_deref(),
                    outcome: "rejected",
                    reason: Some(reason),
                })
                .await;
            return Err(err);
        }
    };

    let outcome = match &issued.code {
        Some(code) => {
            // Delivery failure of the initial code is surfaced: the user
            // must know the code never went out
            if let Err(err) = state.email_service.send_otp_code(&email, purpose, code).await {
                tracing::error!("OTP delivery failed: {}", err);
                state
                    .audit
                    .log(AuditEvent {
                        event: "otp_request",
                        purpose: Some(purpose),
                        email: &email,
                        uid: uid.as_deref(),
                        ip: ctx.ip.as_deref(),
                        outcome: "send_failed",
                        reason: None,
                    })
                    .await;
                return Err(err);
            }
            "sent"
        }
        None => "cooldown",
    };

    state
        .audit
        .log(AuditEvent {
            event: "otp_request",
            purpose: Some(purpose),
            email: &email,
            uid: uid.as_deref(),
            ip: ctx.ip.as_deref(),
            outcome,
            reason: None,
        })
        .await;

    // Success-shaped either way: the response never says whether an
    // account exists, only how long until the next send is allowed
    Ok(Json(RequestOtpResponse {
        success: true,
        cooldown_seconds: issued.cooldown_seconds,
    }))
}

// 2. Verify OTP -> verification token
pub async fn verify_otp(
    State(state): State<AppState>,
    ctx: CallerContext,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<VerifyOtpResponse>> {
    req.validate()
        .map_err(|e| AppError::invalid(format!("Validation error: {}", e)))?;

    // Shape check before storage is touched
    if req.code.len() != 6 || !req.code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::invalid("Code must be 6 digits"));
    }

    let purpose = req.purpose;
    let policy = purpose.policy();

    // For CHANGE_EMAIL the code went to the destination mailbox, so the
    // client resubmits that address here
    let email = if policy.needs_new_email {
        binding_email(purpose, &ctx, None, req.email.as_deref())?
    } else {
        binding_email(purpose, &ctx, req.email.as_deref(), None)?
    };
    let uid = ctx.claims.as_ref().map(|c| c.sub.clone());

    match state.otp_service.verify_code(&email, purpose, &req.code).await? {
        OtpVerification::Verified => {
            let mut metadata = HashMap::new();
            if policy.needs_new_email {
                metadata.insert("new_email".to_string(), email.clone());
            }
            let (token, ttl) = state
                .session_service
                .issue(purpose, &email, uid.clone(), metadata)
                .await?;

            state
                .audit
                .log(AuditEvent {
                    event: "otp_verify",
                    purpose: Some(purpose),
                    email: &email,
                    uid: uid.as_deref(),
                    ip: ctx.ip.as_deref(),
                    outcome: "verified",
                    reason: None,
                })
                .await;

            Ok(Json(VerifyOtpResponse {
                verified: true,
                reason: None,
                attempts_left: None,
                retry_after_seconds: None,
                verification_token: Some(token),
                expires_in_seconds: Some(ttl),
            }))
        }
        OtpVerification::Failed {
            reason,
            attempts_left,
            retry_after_seconds,
        } => {
            state
                .audit
                .log(AuditEvent {
                    event: "otp_verify",
                    purpose: Some(purpose),
                    email: &email,
                    uid: uid.as_deref(),
                    ip: ctx.ip.as_deref(),
                    outcome: "failed",
                    reason: Some(reason),
                })
                .await;

            Ok(Json(VerifyOtpResponse {
                verified: false,
                reason: Some(reason.to_string()),
                attempts_left,
                retry_after_seconds,
                verification_token: None,
                expires_in_seconds: None,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Claims;

    fn anon() -> CallerContext {
        CallerContext {
            claims: None,
            ip: None,
            user_agent: None,
        }
    }

    fn authed(email: &str) -> CallerContext {
        CallerContext {
            claims: Some(Claims {
                sub: "64b0c8f2e4b0a1a2b3c4d5e6".to_string(),
                email: email.to_string(),
                email_verified: true,
                exp: 0,
            }),
            ip: None,
            user_agent: None,
        }
    }

    #[test]
    fn client_purposes_require_a_client_email() {
        let err = binding_email(OtpPurpose::ResetPassword, &anon(), None, None).unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let email =
            binding_email(OtpPurpose::ResetPassword, &anon(), Some(" A@X.com "), None).unwrap();
        assert_eq!(email, "a@x.com");
    }

    #[test]
    fn caller_purposes_reject_anonymous_requests() {
        let err = binding_email(OtpPurpose::ChangePassword, &anon(), None, None).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[test]
    fn caller_purposes_ignore_client_supplied_email() {
        // A caller must not be able to request a code for an arbitrary address
        let email = binding_email(
            OtpPurpose::ChangePassword,
            &authed("me@x.com"),
            Some("attacker@evil.com"),
            None,
        )
        .unwrap();
        assert_eq!(email, "me@x.com");
    }

    #[test]
    fn change_email_binds_to_the_destination_mailbox() {
        let err = binding_email(OtpPurpose::ChangeEmail, &authed("old@x.com"), None, None)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let email = binding_email(
            OtpPurpose::ChangeEmail,
            &authed("old@x.com"),
            None,
            Some("new@x.com"),
        )
        .unwrap();
        assert_eq!(email, "new@x.com");
    }

    #[test]
    fn change_email_still_requires_a_caller() {
        let err =
            binding_email(OtpPurpose::ChangeEmail, &anon(), None, Some("new@x.com")).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }
}
