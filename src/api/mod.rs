//! REST API module.
//!
//! Contains all API routes and handlers for the dashboard, compose and feed clients.

mod bindings;
mod dashboard;
mod forum;
mod metadata;
mod schema;

pub use bindings::*;
pub use dashboard::*;
pub use forum::*;
pub use metadata::*;
pub use schema::*;

use axum::{
    extract::FromRequest,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::{CompanyId, ExperienceId, ForumRef};
use crate::resolver::{CompanyCandidates, COMPANY_COOKIE, COMPANY_HEADER};
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// JSON request body whose rejections use the error envelope.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

// ==================== INPUT HELPERS ====================

fn require<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, AppError> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{} is required", name)))
}

pub(crate) fn parse_company_id(value: Option<&str>) -> Result<CompanyId, AppError> {
    let raw = require(value, "companyId")?;
    CompanyId::parse(raw)
        .ok_or_else(|| AppError::Validation(format!("Invalid companyId '{}'", raw)))
}

pub(crate) fn parse_experience_id(value: Option<&str>) -> Result<ExperienceId, AppError> {
    let raw = require(value, "experienceId")?;
    ExperienceId::parse(raw)
        .ok_or_else(|| AppError::Validation(format!("Invalid experienceId '{}'", raw)))
}

pub(crate) fn parse_forum_ref(value: Option<&str>, name: &str) -> Result<ForumRef, AppError> {
    let raw = require(value, name)?;
    ForumRef::parse(raw).ok_or_else(|| AppError::Validation(format!("Invalid {} '{}'", name, raw)))
}

pub(crate) fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Company candidates carried by every request: trusted header, cookie and
/// the configured default.
pub(crate) fn company_candidates(
    state: &AppState,
    headers: &HeaderMap,
    jar: &CookieJar,
    path: Option<String>,
    query: Option<String>,
) -> CompanyCandidates {
    CompanyCandidates {
        path,
        query,
        pasted: None,
        header: header_value(headers, COMPANY_HEADER),
        cookie: jar.get(COMPANY_COOKIE).map(|c| c.value().to_string()),
        environment: state.config.default_company_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_company_id() {
        assert!(parse_company_id(Some(" biz_1 ")).is_ok());
        assert!(matches!(
            parse_company_id(None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            parse_company_id(Some("exp_1")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_forum_ref() {
        assert!(matches!(
            parse_forum_ref(Some("forums-general"), "forumId"),
            Ok(ForumRef::Slug(_))
        ));
        assert!(parse_forum_ref(Some("biz_1"), "forumId").is_err());
    }
}
