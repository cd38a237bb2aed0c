//! Authentication and authorization.
//!
//! Two independent layers: an optional service PSK checked by middleware with
//! constant-time comparison, and the platform user token that identifies the
//! caller and is checked against company or experience access per operation.

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::models::{CompanyId, ExperienceId};
use crate::platform::{AccessCheck, PlatformApi, USER_TOKEN_HEADER};

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// PSK authentication layer function that takes the expected PSK as a parameter.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // If no PSK is configured, allow all requests (dev mode)
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    // Get the API key from the request header
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match provided {
        Some(provided_key) => {
            if constant_time_compare(&provided_key, &expected) {
                next.run(request).await
            } else {
                unauthorized_response("Invalid API key")
            }
        }
        None => {
            // Also check Authorization header as bearer token
            let bearer = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.to_string());

            match bearer {
                Some(bearer_key) if constant_time_compare(&bearer_key, &expected) => {
                    next.run(request).await
                }
                _ => unauthorized_response("Missing or invalid API key"),
            }
        }
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized_response(message: &str) -> Response {
    AppError::Unauthorized(message.to_string()).into_response()
}

/// The platform user token forwarded with the request, unverified.
///
/// Extraction never fails so handlers can validate their input first and
/// verify the caller only when the operation needs it.
#[derive(Debug, Clone, Default)]
pub struct UserToken(Option<String>);

impl UserToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for UserToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .headers
                .get(USER_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        ))
    }
}

/// Verify the user token and return the caller's user id.
pub async fn authenticate(platform: &dyn PlatformApi, token: &UserToken) -> Result<String, AppError> {
    let Some(token) = token.as_deref() else {
        return Err(AppError::Unauthorized(format!(
            "Missing {} header",
            USER_TOKEN_HEADER
        )));
    };
    Ok(platform.verify_user_token(token).await?)
}

/// Caller must be an admin of the company.
pub async fn require_company_admin(
    platform: &dyn PlatformApi,
    token: &UserToken,
    company_id: &CompanyId,
) -> Result<String, AppError> {
    let user_id = authenticate(platform, token).await?;
    let access = platform.check_company_access(&user_id, company_id).await?;
    if !access.is_admin() {
        tracing::warn!("User {} is not an admin of {}", user_id, company_id);
        return Err(AppError::Forbidden(format!(
            "Admin access to {} required",
            company_id
        )));
    }
    Ok(user_id)
}

/// Caller must have any access to the company.
pub async fn require_company_access(
    platform: &dyn PlatformApi,
    token: &UserToken,
    company_id: &CompanyId,
) -> Result<(String, AccessCheck), AppError> {
    let user_id = authenticate(platform, token).await?;
    let access = platform.check_company_access(&user_id, company_id).await?;
    if !access.has_access {
        tracing::warn!("User {} has no access to {}", user_id, company_id);
        return Err(AppError::Forbidden(format!("No access to {}", company_id)));
    }
    Ok((user_id, access))
}

/// Caller must have any access to the experience.
pub async fn require_experience_access(
    platform: &dyn PlatformApi,
    token: &UserToken,
    experience_id: &ExperienceId,
) -> Result<(String, AccessCheck), AppError> {
    let user_id = authenticate(platform, token).await?;
    let access = platform
        .check_experience_access(&user_id, experience_id)
        .await?;
    if !access.has_access {
        tracing::warn!("User {} has no access to {}", user_id, experience_id);
        return Err(AppError::Forbidden(format!(
            "No access to {}",
            experience_id
        )));
    }
    Ok((user_id, access))
}
