use axum::{extract::State, response::Json, Extension};
use validator::Validate;

use crate::dtos::auth_dtos::{
    ChangeEmailRequest, ChangeEmailResponse, ChangePasswordRequest,
    CompleteEmailVerificationRequest, RegisterRequest, RegisterResponse, ResetPasswordRequest,
    SuccessResponse,
};
use crate::errors::{AppError, Result};
use crate::middleware::auth::CallerContext;
use crate::models::purpose::OtpPurpose;
use crate::models::user::Claims;
use crate::services::audit_service::AuditEvent;
use crate::services::identity_service::normalize_email;
use crate::state::AppState;

// Every handler here is the same thin sequence: validate input, consume the
// matching verification session (the single-use gate), perform exactly one
// identity-store mutation, fire a confirmation, respond.

// 1. Register with a verified email
pub async fn register_with_otp(
    State(state): State<AppState>,
    ctx: CallerContext,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>> {
    req.validate()
        .map_err(|e| AppError::invalid(format!("Validation error: {}", e)))?;

    // An authenticated caller registering again is session confusion
    if ctx.claims.is_some() {
        return Err(AppError::FailedPrecondition(
            "Already signed in".to_string(),
        ));
    }

    let email = normalize_email(&req.email)?;
    state
        .session_service
        .consume(&req.verification_token, OtpPurpose::SignupVerify, Some(&email), None)
        .await?;

    let account_id = state
        .identity_service
        .create_account(&email, &req.name, &req.password)
        .await?;

    if let Err(e) = state.email_service.send_welcome(&email, &req.name).await {
        tracing::warn!("welcome email failed: {}", e);
    }

    state
        .audit
        .log(AuditEvent {
            event: "register",
            purpose: Some(OtpPurpose::SignupVerify),
            email: &email,
            uid: Some(&account_id),
            ip: ctx.ip.as_deref(),
            outcome: "created",
            reason: None,
        })
        .await;

    Ok(Json(RegisterResponse {
        success: true,
        account_id,
    }))
}

// 2. Reset a forgotten password
pub async fn reset_password_with_otp(
    State(state): State<AppState>,
    ctx: CallerContext,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<SuccessResponse>> {
    req.validate()
        .map_err(|e| AppError::invalid(format!("Validation error: {}", e)))?;

    let email = normalize_email(&req.email)?;
    state
        .session_service
        .consume(&req.verification_token, OtpPurpose::ResetPassword, Some(&email), None)
        .await?;

    state
        .identity_service
        .set_password_by_email(&email, &req.new_password)
        .await?;

    if let Err(e) = state.email_service.send_password_changed(&email).await {
        tracing::warn!("password-changed email failed: {}", e);
    }

    state
        .audit
        .log(AuditEvent {
            event: "reset_password",
            purpose: Some(OtpPurpose::ResetPassword),
            email: &email,
            uid: None,
            ip: ctx.ip.as_deref(),
            outcome: "changed",
            reason: None,
        })
        .await;

    Ok(Json(SuccessResponse { success: true }))
}

// 3. Change password (authenticated)
pub async fn change_password_with_otp(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<SuccessResponse>> {
    req.validate()
        .map_err(|e| AppError::invalid(format!("Validation error: {}", e)))?;

    // "Current" email comes from the verified identity, never the client
    let email = normalize_email(&claims.email)?;
    state
        .session_service
        .consume(
            &req.verification_token,
            OtpPurpose::ChangePassword,
            Some(&email),
            Some(&claims.sub),
        )
        .await?;

    state
        .identity_service
        .set_password_by_uid(&claims.sub, &req.new_password)
        .await?;

    if let Err(e) = state.email_service.send_password_changed(&email).await {
        tracing::warn!("password-changed email failed: {}", e);
    }

    state
        .audit
        .log(AuditEvent {
            event: "change_password",
            purpose: Some(OtpPurpose::ChangePassword),
            email: &email,
            uid: Some(&claims.sub),
            ip: None,
            outcome: "changed",
            reason: None,
        })
        .await;

    Ok(Json(SuccessResponse { success: true }))
}

// 4. Complete email verification (authenticated)
pub async fn complete_email_verification_with_otp(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CompleteEmailVerificationRequest>,
) -> Result<Json<SuccessResponse>> {
    req.validate()
        .map_err(|e| AppError::invalid(format!("Validation error: {}", e)))?;

    let email = normalize_email(&claims.email)?;
    state
        .session_service
        .consume(
            &req.verification_token,
            OtpPurpose::EmailVerify,
            Some(&email),
            Some(&claims.sub),
        )
        .await?;

    state.identity_service.mark_email_verified(&claims.sub).await?;

    state
        .audit
        .log(AuditEvent {
            event: "verify_email",
            purpose: Some(OtpPurpose::EmailVerify),
            email: &email,
            uid: Some(&claims.sub),
            ip: None,
            outcome: "verified",
            reason: None,
        })
        .await;

    Ok(Json(SuccessResponse { success: true }))
}

// 5. Change email (authenticated; the token was issued for the new address)
pub async fn change_email_with_otp(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangeEmailRequest>,
) -> Result<Json<ChangeEmailResponse>> {
    req.validate()
        .map_err(|e| AppError::invalid(format!("Validation error: {}", e)))?;

    let new_email = normalize_email(&req.new_email)?;
    state
        .session_service
        .consume(
            &req.verification_token,
            OtpPurpose::ChangeEmail,
            Some(&new_email),
            Some(&claims.sub),
        )
        .await?;

    state.identity_service.set_email(&claims.sub, &new_email).await?;

    // Tell the old mailbox; its owner needs to hear about a takeover
    if let Err(e) = state
        .email_service
        .send_email_changed(&claims.email, &new_email)
        .await
    {
        tracing::warn!("email-changed notice failed: {}", e);
    }

    state
        .audit
        .log(AuditEvent {
            event: "change_email",
            purpose: Some(OtpPurpose::ChangeEmail),
            email: &new_email,
            uid: Some(&claims.sub),
            ip: None,
            outcome: "changed",
            reason: None,
        })
        .await;

    Ok(Json(ChangeEmailResponse {
        success: true,
        email: new_email,
    }))
}
