//! Post metadata API endpoints.

use axum::extract::{Path, Query, State};

use super::{parse_company_id, success, ApiJson, ApiResult};
use crate::auth::{require_company_access, UserToken};
use crate::errors::AppError;
use crate::models::{
    is_placeholder, placeholder_post_id, validate_field_values, AttachPostRequest, CompanyId,
    CreateMetadataRequest, CreatedMetadata, MetadataQuery, PostMetadata,
};
use crate::AppState;

/// GET /api/post-metadata?postId= - Metadata of a post, or null.
pub async fn get_metadata_by_post(
    State(state): State<AppState>,
    Query(query): Query<MetadataQuery>,
) -> ApiResult<Option<PostMetadata>> {
    let Some(post_id) = query.post_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Err(AppError::Validation("postId is required".to_string()));
    };
    success(state.repo.find_metadata_by_post(post_id).await?)
}

/// POST /api/post-metadata - Store field values for a post.
///
/// Without a postId the record gets a placeholder id to be attached later.
pub async fn create_metadata(
    State(state): State<AppState>,
    token: UserToken,
    ApiJson(request): ApiJson<CreateMetadataRequest>,
) -> ApiResult<CreatedMetadata> {
    let company_id = parse_company_id(request.company_id.as_deref())?;
    let data = request.data.unwrap_or_default();
    validate_field_values(&data).map_err(AppError::Validation)?;
    let post_id = request
        .post_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(placeholder_post_id);

    let (user_id, _) = require_company_access(state.platform.as_ref(), &token, &company_id).await?;
    let metadata = state
        .repo
        .create_metadata(&post_id, &company_id, &user_id, &data)
        .await?;

    success(CreatedMetadata {
        placeholder: metadata.is_placeholder(),
        id: metadata.id,
        post_id: metadata.post_id,
    })
}

/// GET /api/post-metadata/{id} - A metadata record, or null.
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Option<PostMetadata>> {
    success(state.repo.get_metadata(&id).await?)
}

/// PATCH /api/post-metadata/{id} - Attach the real post to a placeholder record.
pub async fn attach_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    token: UserToken,
    ApiJson(request): ApiJson<AttachPostRequest>,
) -> ApiResult<PostMetadata> {
    let Some(post_ref) = request.post_ref() else {
        return Err(AppError::Validation(
            "postId or postUrl is required".to_string(),
        ));
    };
    if is_placeholder(post_ref) {
        return Err(AppError::Validation(format!(
            "'{}' is a placeholder, not a post reference",
            post_ref
        )));
    }

    let existing = state
        .repo
        .get_metadata(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Metadata {} not found", id)))?;
    let company_id = CompanyId::parse(&existing.company_id).ok_or_else(|| {
        AppError::Internal(format!(
            "Metadata {} has malformed company id '{}'",
            id, existing.company_id
        ))
    })?;

    require_company_access(state.platform.as_ref(), &token, &company_id).await?;
    success(state.repo.attach_post(&id, post_ref).await?)
}
