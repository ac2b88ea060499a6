use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::errors::AppError;
use crate::models::user::Claims;
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
}

fn decode_claims(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )
    .ok()
    .map(|data| data.claims)
}

/// Hard gate for step-up routes: valid bearer token or 401. Claims land in
/// request extensions for the handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(&headers).ok_or(StatusCode::UNAUTHORIZED)?;
    let claims = decode_claims(token, &state.jwt_secret).ok_or(StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Who is calling, when authentication is optional: claims if a valid
/// bearer token is present, plus client IP and User-Agent for audit and
/// device fingerprinting. A present-but-invalid token is an error, not an
/// anonymous caller.
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub claims: Option<Claims>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn client_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CallerContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = match bearer_token(&parts.headers) {
            Some(token) => Some(
                decode_claims(token, &state.jwt_secret).ok_or(AppError::Unauthenticated)?,
            ),
            None => None,
        };

        Ok(CallerContext {
            claims,
            ip: client_ip(&parts.headers),
            user_agent: client_user_agent(&parts.headers),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn missing_headers_yield_none() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);
        assert_eq!(client_user_agent(&headers), None);
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Token abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
