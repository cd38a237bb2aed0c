//! Company → forum binding model.

use serde::{Deserialize, Serialize};

/// A stored association of a company with one of its forum experiences.
///
/// Rows are never deleted; unbinding clears `enabled`. At most one row per
/// company is enabled at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ForumBinding {
    pub id: String,
    pub company_id: String,
    /// Canonical `exp_` id or legacy `forums-` slug
    pub forum_id: String,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Query parameters for listing bindings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingsQuery {
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub experience_id: Option<String>,
}

/// Request body for binding a forum under `/api/bindings`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBindingRequest {
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub experience_id: Option<String>,
}

/// Request body for binding a forum under `/api/bindings/{companyId}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindForumRequest {
    #[serde(default, alias = "experienceId")]
    pub forum_id: Option<String>,
}

/// Query parameters for unbinding.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnbindQuery {
    #[serde(default)]
    pub forum_id: Option<String>,
}

/// Result of an unbind: how many rows went from enabled to disabled.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnbindResult {
    pub ok: bool,
    pub disabled: u64,
}
