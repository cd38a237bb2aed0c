//! Dashboard company context and caller profile endpoints.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

use super::{company_candidates, success, ApiJson, ApiResponse, ApiResult};
use crate::auth::{authenticate, UserToken};
use crate::errors::AppError;
use crate::models::{CompanyId, ForumBinding, UserProfile};
use crate::resolver::{extract_company_id, resolve_company, Traced, COMPANY_COOKIE};
use crate::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuery {
    #[serde(default)]
    pub company_id: Option<String>,
    /// A dashboard URL or id pasted by the user
    #[serde(default)]
    pub pasted: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectCompanyRequest {
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedCompany {
    pub company_id: CompanyId,
}

/// Resolved dashboard company with its trace and current binding.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardContext {
    #[serde(flatten)]
    pub company: Traced<CompanyId>,
    pub active_binding: Option<ForumBinding>,
    /// Metadata records still waiting for their real post id
    pub pending_attachments: i64,
}

/// GET /api/dashboard/context - Resolve the dashboard company from the request.
pub async fn dashboard_context(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> ApiResult<DashboardContext> {
    success(resolve_dashboard(&state, None, query, &headers, &jar).await?)
}

/// GET /api/dashboard/{companyId}/context - Same, with a path candidate.
pub async fn dashboard_company_context(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Query(query): Query<DashboardQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> ApiResult<DashboardContext> {
    success(resolve_dashboard(&state, Some(company_id), query, &headers, &jar).await?)
}

/// POST /api/dashboard/company - Remember a pasted company in a cookie.
pub async fn select_dashboard_company(
    jar: CookieJar,
    ApiJson(request): ApiJson<SelectCompanyRequest>,
) -> Result<(CookieJar, ApiResponse<SelectedCompany>), AppError> {
    let Some(input) = request.input.as_deref().filter(|s| !s.trim().is_empty()) else {
        return Err(AppError::Validation("input is required".to_string()));
    };
    let company_id = extract_company_id(input).ok_or_else(|| {
        AppError::Validation(format!("No company id found in '{}'", input.trim()))
    })?;

    let cookie = Cookie::build((COMPANY_COOKIE, company_id.to_string()))
        .path("/")
        .max_age(time::Duration::days(1))
        .same_site(SameSite::Lax)
        .http_only(true);

    tracing::debug!("Dashboard company set to {}", company_id);
    Ok((
        jar.add(cookie),
        ApiResponse::new(SelectedCompany { company_id }),
    ))
}

/// GET /api/me - The caller's platform profile.
pub async fn get_me(State(state): State<AppState>, token: UserToken) -> ApiResult<UserProfile> {
    let user_id = authenticate(state.platform.as_ref(), &token).await?;

    let profile = match state.platform.get_user(&user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => UserProfile {
            id: user_id,
            ..Default::default()
        },
        Err(e) => {
            tracing::warn!("Profile lookup for {} failed: {}", user_id, e);
            UserProfile {
                id: user_id,
                ..Default::default()
            }
        }
    };
    success(profile)
}

async fn resolve_dashboard(
    state: &AppState,
    path: Option<String>,
    query: DashboardQuery,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Result<DashboardContext, AppError> {
    let mut candidates = company_candidates(state, headers, jar, path, query.company_id);
    candidates.pasted = query.pasted;

    let company = resolve_company(&candidates, &state.config.company_precedence);
    let (active_binding, pending_attachments) = match company.value() {
        Some(company_id) => (
            state.repo.find_active_binding(company_id).await?,
            state.repo.count_pending_attachments(company_id).await?,
        ),
        None => (None, 0),
    };

    Ok(DashboardContext {
        company,
        active_binding,
        pending_attachments,
    })
}
