//! Post metadata model: custom field values attached to one forum post.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix of locally generated post ids awaiting the real forum post.
pub const PLACEHOLDER_PREFIX: &str = "temp_";

/// Ordered key → primitive value map.
pub type FieldValues = Map<String, Value>;

/// Custom field values stored for a forum post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostMetadata {
    pub id: String,
    /// Real post id, post URL, or a `temp_<millis>` placeholder
    pub post_id: String,
    pub company_id: String,
    pub created_by_user_id: String,
    pub data: FieldValues,
    pub created_at: String,
    pub updated_at: String,
}

impl PostMetadata {
    pub fn is_placeholder(&self) -> bool {
        is_placeholder(&self.post_id)
    }
}

pub fn is_placeholder(post_id: &str) -> bool {
    post_id.starts_with(PLACEHOLDER_PREFIX)
}

/// Generate a placeholder post id from the current time.
pub fn placeholder_post_id() -> String {
    format!(
        "{}{}",
        PLACEHOLDER_PREFIX,
        chrono::Utc::now().timestamp_millis()
    )
}

/// Reject nested values; metadata holds only strings, numbers, booleans and nulls.
pub fn validate_field_values(data: &FieldValues) -> Result<(), String> {
    for (key, value) in data {
        if key.trim().is_empty() {
            return Err("Field keys must not be empty".to_string());
        }
        if matches!(value, Value::Array(_) | Value::Object(_)) {
            return Err(format!("Field '{}' must be a primitive value", key));
        }
    }
    Ok(())
}

/// Request body for creating metadata.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMetadataRequest {
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub data: Option<FieldValues>,
}

/// Request body for attaching the real post to a metadata record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachPostRequest {
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub post_url: Option<String>,
}

impl AttachPostRequest {
    /// The post reference to attach; an explicit id wins over a URL.
    pub fn post_ref(&self) -> Option<&str> {
        self.post_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                self.post_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataQuery {
    #[serde(default)]
    pub post_id: Option<String>,
}

/// Response for metadata creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedMetadata {
    pub id: String,
    pub post_id: String,
    pub placeholder: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_placeholder_ids() {
        let id = placeholder_post_id();
        assert!(is_placeholder(&id));
        assert!(id[PLACEHOLDER_PREFIX.len()..].parse::<i64>().is_ok());
        assert!(!is_placeholder("post_abc"));
    }

    #[test]
    fn test_nested_values_rejected() {
        let ok = json!({ "color": "red", "count": 3, "agree": true, "note": null });
        assert!(validate_field_values(ok.as_object().unwrap()).is_ok());

        let nested = json!({ "color": ["red"] });
        let err = validate_field_values(nested.as_object().unwrap()).unwrap_err();
        assert!(err.contains("color"));
    }

    #[test]
    fn test_attach_prefers_post_id() {
        let req = AttachPostRequest {
            post_id: Some(" post_abc ".to_string()),
            post_url: Some("https://example.com/p/1".to_string()),
        };
        assert_eq!(req.post_ref(), Some("post_abc"));

        let req = AttachPostRequest {
            post_id: Some("".to_string()),
            post_url: Some("https://example.com/p/1".to_string()),
        };
        assert_eq!(req.post_ref(), Some("https://example.com/p/1"));
    }
}
