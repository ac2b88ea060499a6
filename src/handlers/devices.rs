use axum::{extract::State, http::HeaderMap, response::Json, Extension};
use validator::Validate;

use crate::dtos::auth_dtos::{RecordDeviceRequest, RecordDeviceResponse};
use crate::errors::{AppError, Result};
use crate::middleware::auth::{client_ip, client_user_agent};
use crate::models::user::Claims;
use crate::services::audit_service::AuditEvent;
use crate::services::device_service::DeviceMeta;
use crate::state::AppState;

// Record a login's device context; first sight of a device triggers a
// "new sign-in" notice to the account's email
pub async fn record_login_device(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(req): Json<RecordDeviceRequest>,
) -> Result<Json<RecordDeviceResponse>> {
    req.validate()
        .map_err(|e| AppError::invalid(format!("Validation error: {}", e)))?;

    let ip = client_ip(&headers);
    let user_agent = client_user_agent(&headers);

    let meta = DeviceMeta {
        device_id: req.device_id,
        platform: req.platform,
        model: req.model,
        app_version: req.app_version,
        locale: req.locale,
        push_token: req.push_token,
    };

    let is_new_device = state
        .device_service
        .record_login(&claims.sub, &meta, ip.as_deref(), user_agent.as_deref())
        .await?;

    if is_new_device {
        let description = describe_device(&meta, user_agent.as_deref());
        if let Err(e) = state
            .email_service
            .send_new_device(&claims.email, &description)
            .await
        {
            tracing::warn!("new-device email failed: {}", e);
        }
    }

    state
        .audit
        .log(AuditEvent {
            event: "login_device",
            purpose: None,
            email: &claims.email,
            uid: Some(&claims.sub),
            ip: ip.as_deref(),
            outcome: if is_new_device { "new_device" } else { "known_device" },
            reason: None,
        })
        .await;

    // Opportunistic cleanup of the stale tail; never blocks the response
    let device_service = state.device_service.clone();
    tokio::spawn(async move {
        match device_service.prune_stale().await {
            Ok(0) => {}
            Ok(n) => tracing::info!("pruned {} stale device records", n),
            Err(e) => tracing::warn!("device prune failed: {}", e),
        }
    });

    Ok(Json(RecordDeviceResponse {
        success: true,
        is_new_device,
    }))
}

fn describe_device(meta: &DeviceMeta, user_agent: Option<&str>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(platform) = meta.platform.as_deref() {
        parts.push(platform);
    }
    if let Some(model) = meta.model.as_deref() {
        parts.push(model);
    }
    if parts.is_empty() {
        if let Some(ua) = user_agent {
            parts.push(ua);
        }
    }
    if parts.is_empty() {
        return "an unrecognized device".to_string();
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_prefers_platform_and_model() {
        let meta = DeviceMeta {
            platform: Some("iOS".to_string()),
            model: Some("iPhone 15".to_string()),
            ..Default::default()
        };
        assert_eq!(describe_device(&meta, Some("SomeUA/1.0")), "iOS iPhone 15");
    }

    #[test]
    fn description_falls_back_to_user_agent_then_generic() {
        let meta = DeviceMeta::default();
        assert_eq!(describe_device(&meta, Some("SomeUA/1.0")), "SomeUA/1.0");
        assert_eq!(describe_device(&meta, None), "an unrecognized device");
    }
}
