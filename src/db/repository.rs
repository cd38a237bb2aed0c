//! Database repository for bindings, schemas and post metadata.
//!
//! Uses prepared statements and transactions for data integrity.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    CompanyId, CompanySchema, FieldValues, ForumBinding, ForumRef, PostFieldSchema, PostMetadata,
    PLACEHOLDER_PREFIX,
};

const BINDING_COLUMNS: &str = "id, company_id, forum_id, enabled, created_at, updated_at";
const METADATA_COLUMNS: &str =
    "id, post_id, company_id, created_by_user_id, data_json, created_at, updated_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== BINDING OPERATIONS ====================

    /// List enabled bindings of a company.
    pub async fn list_company_bindings(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ForumBinding>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM forum_bindings WHERE company_id = ? AND enabled = 1 ORDER BY updated_at DESC",
            BINDING_COLUMNS
        ))
        .bind(company_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(binding_from_row).collect())
    }

    /// List enabled bindings pointing at a forum, i.e. which company owns it.
    pub async fn list_forum_bindings(&self, forum_id: &str) -> Result<Vec<ForumBinding>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM forum_bindings WHERE forum_id = ? AND enabled = 1 ORDER BY updated_at DESC",
            BINDING_COLUMNS
        ))
        .bind(forum_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(binding_from_row).collect())
    }

    /// The single enabled binding of a company, if any.
    pub async fn find_active_binding(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<ForumBinding>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM forum_bindings WHERE company_id = ? AND enabled = 1",
            BINDING_COLUMNS
        ))
        .bind(company_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(binding_from_row))
    }

    /// Make `forum` the company's only enabled binding.
    ///
    /// Other enabled rows are disabled and the pair is upserted in one
    /// transaction, so readers never see two enabled rows. Re-binding the
    /// already active pair leaves the row untouched.
    pub async fn bind_forum(
        &self,
        company_id: &CompanyId,
        forum: &ForumRef,
    ) -> Result<ForumBinding, AppError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let disabled = sqlx::query(
            "UPDATE forum_bindings SET enabled = 0, updated_at = ? WHERE company_id = ? AND forum_id <> ? AND enabled = 1",
        )
        .bind(&now)
        .bind(company_id.as_str())
        .bind(forum.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"INSERT INTO forum_bindings (id, company_id, forum_id, enabled, created_at, updated_at)
               VALUES (?, ?, ?, 1, ?, ?)
               ON CONFLICT(company_id, forum_id) DO UPDATE SET
                   enabled = 1,
                   updated_at = CASE WHEN forum_bindings.enabled = 1
                                     THEN forum_bindings.updated_at
                                     ELSE excluded.updated_at END"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(company_id.as_str())
        .bind(forum.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM forum_bindings WHERE company_id = ? AND forum_id = ?",
            BINDING_COLUMNS
        ))
        .bind(company_id.as_str())
        .bind(forum.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if disabled > 0 {
            tracing::info!(
                "Company {} switched forum to {} ({} binding(s) disabled)",
                company_id,
                forum,
                disabled
            );
        }

        Ok(binding_from_row(&row))
    }

    /// Disable the company's binding to `forum_id`. Returns the number of rows disabled.
    pub async fn unbind_forum(&self, company_id: &CompanyId, forum_id: &str) -> Result<u64, AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE forum_bindings SET enabled = 0, updated_at = ? WHERE company_id = ? AND forum_id = ? AND enabled = 1",
        )
        .bind(&now)
        .bind(company_id.as_str())
        .bind(forum_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ==================== SCHEMA OPERATIONS ====================

    /// Get a company's field schema; companies without one get an empty schema.
    pub async fn get_schema(&self, company_id: &CompanyId) -> Result<CompanySchema, AppError> {
        let row = sqlx::query(
            "SELECT schema_json, updated_at FROM company_post_field_schemas WHERE company_id = ?",
        )
        .bind(company_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => {
                let schema_json: String = row.get("schema_json");
                CompanySchema {
                    company_id: company_id.to_string(),
                    schema: parse_schema(&schema_json),
                    updated_at: Some(row.get("updated_at")),
                }
            }
            None => CompanySchema {
                company_id: company_id.to_string(),
                schema: PostFieldSchema::default(),
                updated_at: None,
            },
        })
    }

    /// Replace a company's field schema.
    pub async fn save_schema(
        &self,
        company_id: &CompanyId,
        schema: &PostFieldSchema,
    ) -> Result<CompanySchema, AppError> {
        let now = Utc::now().to_rfc3339();
        let schema_json = serde_json::to_string(schema)?;

        sqlx::query(
            r#"INSERT INTO company_post_field_schemas (company_id, schema_json, created_at, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(company_id) DO UPDATE SET
                   schema_json = excluded.schema_json,
                   updated_at = excluded.updated_at"#,
        )
        .bind(company_id.as_str())
        .bind(&schema_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(CompanySchema {
            company_id: company_id.to_string(),
            schema: schema.clone(),
            updated_at: Some(now),
        })
    }

    // ==================== METADATA OPERATIONS ====================

    /// Store custom field values for a post (or a placeholder post id).
    pub async fn create_metadata(
        &self,
        post_id: &str,
        company_id: &CompanyId,
        user_id: &str,
        data: &FieldValues,
    ) -> Result<PostMetadata, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let data_json = serde_json::to_string(data)?;

        sqlx::query(
            "INSERT INTO post_metadata (id, post_id, company_id, created_by_user_id, data_json, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(post_id)
        .bind(company_id.as_str())
        .bind(user_id)
        .bind(&data_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(PostMetadata {
            id,
            post_id: post_id.to_string(),
            company_id: company_id.to_string(),
            created_by_user_id: user_id.to_string(),
            data: data.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a metadata record by its id.
    pub async fn get_metadata(&self, id: &str) -> Result<Option<PostMetadata>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM post_metadata WHERE id = ?",
            METADATA_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(metadata_from_row))
    }

    /// Get the newest metadata record for a post.
    pub async fn find_metadata_by_post(
        &self,
        post_id: &str,
    ) -> Result<Option<PostMetadata>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM post_metadata WHERE post_id = ? ORDER BY created_at DESC LIMIT 1",
            METADATA_COLUMNS
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(metadata_from_row))
    }

    /// Replace a placeholder post id with the real post reference.
    ///
    /// Attaching the id the record already carries is a no-op; a record that
    /// already points at a different real post is a conflict.
    pub async fn attach_post(&self, id: &str, post_id: &str) -> Result<PostMetadata, AppError> {
        let existing = self
            .get_metadata(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Metadata {} not found", id)))?;

        if existing.post_id == post_id {
            return Ok(existing);
        }
        if !existing.is_placeholder() {
            return Err(AppError::Conflict(format!(
                "Metadata {} is already attached to post {}",
                id, existing.post_id
            )));
        }

        let now = Utc::now().to_rfc3339();

        // Conditional write so two concurrent attachments cannot both win
        let result = sqlx::query(
            "UPDATE post_metadata SET post_id = ?, updated_at = ? WHERE id = ? AND post_id = ?",
        )
        .bind(post_id)
        .bind(&now)
        .bind(id)
        .bind(&existing.post_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(
                "Concurrent attachment detected".to_string(),
            ));
        }

        tracing::info!(
            "Attached metadata {} from {} to post {}",
            id,
            existing.post_id,
            post_id
        );

        Ok(PostMetadata {
            post_id: post_id.to_string(),
            updated_at: now,
            ..existing
        })
    }

    /// Count placeholder records of a company still waiting for their post.
    pub async fn count_pending_attachments(&self, company_id: &CompanyId) -> Result<i64, AppError> {
        // `_` is a LIKE wildcard, so the prefix is escaped
        let pattern = format!("{}%", PLACEHOLDER_PREFIX.replace('_', "\\_"));
        let count: i64 = sqlx::query_scalar(
            r"SELECT COUNT(*) FROM post_metadata WHERE company_id = ? AND post_id LIKE ? ESCAPE '\'",
        )
        .bind(company_id.as_str())
        .bind(pattern)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// ==================== ROW MAPPING HELPERS ====================

fn binding_from_row(row: &sqlx::sqlite::SqliteRow) -> ForumBinding {
    let enabled: i32 = row.get("enabled");
    ForumBinding {
        id: row.get("id"),
        company_id: row.get("company_id"),
        forum_id: row.get("forum_id"),
        enabled: enabled != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn metadata_from_row(row: &sqlx::sqlite::SqliteRow) -> PostMetadata {
    let data_json: String = row.get("data_json");
    PostMetadata {
        id: row.get("id"),
        post_id: row.get("post_id"),
        company_id: row.get("company_id"),
        created_by_user_id: row.get("created_by_user_id"),
        data: parse_field_values(&data_json),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn parse_field_values(s: &str) -> FieldValues {
    serde_json::from_str(s).unwrap_or_else(|e| {
        tracing::warn!("Stored field values are unreadable, serving none: {}", e);
        FieldValues::new()
    })
}

fn parse_schema(s: &str) -> PostFieldSchema {
    serde_json::from_str(s).unwrap_or_else(|e| {
        tracing::warn!("Stored field schema is unreadable, serving empty schema: {}", e);
        PostFieldSchema::default()
    })
}
