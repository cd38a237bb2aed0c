//! Forum binding API endpoints.

use axum::extract::{Path, Query, State};

use super::{parse_company_id, parse_forum_ref, success, ApiJson, ApiResult};
use crate::auth::{require_company_admin, UserToken};
use crate::errors::AppError;
use crate::models::{
    BindForumRequest, BindingsQuery, CreateBindingRequest, ForumBinding, UnbindQuery,
    UnbindResult,
};
use crate::AppState;

/// GET /api/bindings - List enabled bindings by company or by forum.
pub async fn list_bindings(
    State(state): State<AppState>,
    Query(query): Query<BindingsQuery>,
) -> ApiResult<Vec<ForumBinding>> {
    if query.company_id.is_some() {
        let company_id = parse_company_id(query.company_id.as_deref())?;
        return success(state.repo.list_company_bindings(&company_id).await?);
    }
    if query.experience_id.is_some() {
        let forum = parse_forum_ref(query.experience_id.as_deref(), "experienceId")?;
        return success(state.repo.list_forum_bindings(forum.as_str()).await?);
    }
    Err(AppError::Validation(
        "companyId or experienceId is required".to_string(),
    ))
}

/// POST /api/bindings - Bind a forum to a company.
pub async fn create_binding(
    State(state): State<AppState>,
    token: UserToken,
    ApiJson(request): ApiJson<CreateBindingRequest>,
) -> ApiResult<ForumBinding> {
    let company_id = parse_company_id(request.company_id.as_deref())?;
    let forum = parse_forum_ref(request.experience_id.as_deref(), "experienceId")?;

    let user_id = require_company_admin(state.platform.as_ref(), &token, &company_id).await?;
    let binding = state.repo.bind_forum(&company_id, &forum).await?;

    tracing::info!("User {} bound {} to {}", user_id, forum, company_id);
    success(binding)
}

/// GET /api/bindings/{companyId} - List a company's enabled bindings.
pub async fn list_company_bindings(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> ApiResult<Vec<ForumBinding>> {
    let company_id = parse_company_id(Some(&company_id))?;
    success(state.repo.list_company_bindings(&company_id).await?)
}

/// POST /api/bindings/{companyId} - Make a forum the company's active binding.
pub async fn bind_company_forum(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    token: UserToken,
    ApiJson(request): ApiJson<BindForumRequest>,
) -> ApiResult<ForumBinding> {
    let company_id = parse_company_id(Some(&company_id))?;
    let forum = parse_forum_ref(request.forum_id.as_deref(), "forumId")?;

    let user_id = require_company_admin(state.platform.as_ref(), &token, &company_id).await?;
    let binding = state.repo.bind_forum(&company_id, &forum).await?;

    tracing::info!("User {} bound {} to {}", user_id, forum, company_id);
    success(binding)
}

/// DELETE /api/bindings/{companyId}?forumId= - Disable a binding.
pub async fn unbind_company_forum(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Query(query): Query<UnbindQuery>,
    token: UserToken,
) -> ApiResult<UnbindResult> {
    let company_id = parse_company_id(Some(&company_id))?;
    let forum = parse_forum_ref(query.forum_id.as_deref(), "forumId")?;

    let user_id = require_company_admin(state.platform.as_ref(), &token, &company_id).await?;
    let disabled = state.repo.unbind_forum(&company_id, forum.as_str()).await?;

    if disabled > 0 {
        tracing::info!("User {} unbound {} from {}", user_id, forum, company_id);
    }
    success(UnbindResult { ok: true, disabled })
}

/// GET /api/bindings/{companyId}/active - The company's active binding, or null.
pub async fn get_active_binding(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> ApiResult<Option<ForumBinding>> {
    let company_id = parse_company_id(Some(&company_id))?;
    success(state.repo.find_active_binding(&company_id).await?)
}
