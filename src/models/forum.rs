//! Forum and experience models exchanged with the host platform.

use serde::{Deserialize, Serialize};

use super::FieldValues;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompanyRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// An experience (embeddable surface) inside a company.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Experience {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<CompanyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppRef>,
    #[serde(default, alias = "slug", skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

impl Experience {
    /// Owning company, from either the nested object or the flat field.
    pub fn owner(&self) -> Option<&str> {
        self.company
            .as_ref()
            .map(|c| c.id.as_str())
            .or(self.company_id.as_deref())
    }

    /// Heuristic used when a company has no binding: forum apps are named
    /// "...forum..." and forum routes start with `forums-`.
    pub fn looks_like_forum(&self) -> bool {
        let app_name = self
            .app
            .as_ref()
            .and_then(|a| a.name.as_deref())
            .or(self.name.as_deref())
            .unwrap_or_default()
            .to_lowercase();
        let route = self.route.as_deref().unwrap_or_default().to_lowercase();
        app_name.contains("forum") || route.starts_with("forums-")
    }

    /// Whether the legacy slug names this experience.
    pub fn matches_slug(&self, slug: &str) -> bool {
        self.route
            .as_deref()
            .is_some_and(|r| r.to_lowercase().contains(&slug.to_lowercase()))
    }

    pub fn belongs_to_app(&self, app_id: &str) -> bool {
        self.app
            .as_ref()
            .and_then(|a| a.id.as_deref())
            .is_some_and(|id| id == app_id)
    }
}

/// Experience summary returned by listing endpoints.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExperienceSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<&Experience> for ExperienceSummary {
    fn from(e: &Experience) -> Self {
        Self {
            id: e.id.clone(),
            name: e.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyExperiences {
    pub company_id: String,
    pub experiences: Vec<ExperienceSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PostAuthor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// A post in a forum experience.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ForumPost {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "author", skip_serializing_if = "Option::is_none")]
    pub user: Option<PostAuthor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<i64>,
}

/// One page of forum posts.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub posts: Vec<ForumPost>,
    pub has_next_page: bool,
}

/// A post to create on behalf of a member.
#[derive(Debug, Clone, PartialEq)]
pub struct NewForumPost {
    pub experience_id: String,
    pub title: String,
    pub content: String,
    pub author_user_id: String,
}

/// Identifier (and link, when known) of a created post.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPost {
    pub post_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
}

/// Request body for composing a post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposePostRequest {
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub fields_data: Option<FieldValues>,
}

/// Response for a composed post.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposePostResponse {
    /// Real post id, or the placeholder stored on the metadata record
    pub post_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    pub metadata_id: String,
    pub placeholder: bool,
}

/// A host platform user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}
