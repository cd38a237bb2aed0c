//! Company field schema API endpoints.

use axum::extract::{Path, State};

use super::{parse_company_id, success, ApiJson, ApiResult};
use crate::auth::{require_company_admin, UserToken};
use crate::errors::AppError;
use crate::models::{CompanySchema, SaveSchemaRequest};
use crate::AppState;

/// GET /api/schema/{companyId} - Get a company's field schema.
pub async fn get_schema(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> ApiResult<CompanySchema> {
    let company_id = parse_company_id(Some(&company_id))?;
    success(state.repo.get_schema(&company_id).await?)
}

/// PUT /api/schema/{companyId} - Replace a company's field schema.
pub async fn save_schema(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    token: UserToken,
    ApiJson(request): ApiJson<SaveSchemaRequest>,
) -> ApiResult<CompanySchema> {
    let company_id = parse_company_id(Some(&company_id))?;
    let Some(raw) = request.schema else {
        return Err(AppError::Validation("schema is required".to_string()));
    };
    let schema = raw.normalize();
    if schema.fields.len() < raw.fields.len() {
        tracing::debug!(
            "Dropped {} unnamed or repeated field(s) from schema of {}",
            raw.fields.len() - schema.fields.len(),
            company_id
        );
    }

    require_company_admin(state.platform.as_ref(), &token, &company_id).await?;
    success(state.repo.save_schema(&company_id, &schema).await?)
}
