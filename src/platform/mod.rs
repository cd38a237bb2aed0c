//! Host platform API.
//!
//! The service only reads from the platform, except for creating forum posts
//! on behalf of members. Everything goes through [`PlatformApi`] so handlers
//! and the resolver never depend on the transport.

mod http;

pub use http::{HttpPlatformClient, USER_TOKEN_HEADER};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{
    CompanyId, CreatedPost, Experience, ExperienceId, NewForumPost, PostPage, UserProfile,
};

/// Number of posts requested per feed page.
pub const FEED_PAGE_SIZE: u32 = 20;

/// Failure talking to the host platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The user token was missing, malformed, or rejected
    InvalidToken(String),
    /// Transport failure or timeout
    Unavailable(String),
    /// Non-success HTTP status
    Status { status: u16, message: String },
    /// Response body did not match the expected shape
    Decode(String),
    /// No API key configured
    NotConfigured,
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformError::InvalidToken(msg) => write!(f, "invalid user token: {}", msg),
            PlatformError::Unavailable(msg) => write!(f, "platform unavailable: {}", msg),
            PlatformError::Status { status, message } => {
                write!(f, "platform returned {}: {}", status, message)
            }
            PlatformError::Decode(msg) => write!(f, "unexpected platform response: {}", msg),
            PlatformError::NotConfigured => write!(f, "platform API key is not configured"),
        }
    }
}

impl std::error::Error for PlatformError {}

/// Access level of a user on a company or experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Admin,
    Member,
    None,
}

impl AccessLevel {
    /// Map the platform's level names; customers are members.
    pub fn from_platform(level: &str) -> Self {
        match level {
            "admin" => AccessLevel::Admin,
            "member" | "customer" => AccessLevel::Member,
            _ => AccessLevel::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheck {
    pub has_access: bool,
    pub level: AccessLevel,
}

impl AccessCheck {
    pub fn is_admin(&self) -> bool {
        self.has_access && self.level == AccessLevel::Admin
    }
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Verify a user token forwarded by the platform and return the user id.
    async fn verify_user_token(&self, token: &str) -> Result<String, PlatformError>;

    async fn check_company_access(
        &self,
        user_id: &str,
        company_id: &CompanyId,
    ) -> Result<AccessCheck, PlatformError>;

    async fn check_experience_access(
        &self,
        user_id: &str,
        experience_id: &ExperienceId,
    ) -> Result<AccessCheck, PlatformError>;

    async fn list_experiences(&self, company_id: &CompanyId)
        -> Result<Vec<Experience>, PlatformError>;

    /// Forum experiences of a company.
    async fn list_forums(&self, company_id: &CompanyId) -> Result<Vec<Experience>, PlatformError>;

    async fn get_experience(
        &self,
        experience_id: &ExperienceId,
    ) -> Result<Option<Experience>, PlatformError>;

    async fn list_forum_posts(
        &self,
        experience_id: &ExperienceId,
        limit: u32,
    ) -> Result<PostPage, PlatformError>;

    /// Create a post as `post.author_user_id`. `Ok(None)` means the platform
    /// accepted the call but returned no post id.
    async fn create_forum_post(
        &self,
        post: &NewForumPost,
    ) -> Result<Option<CreatedPost>, PlatformError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, PlatformError>;
}

/// Find the canonical id behind a legacy `forums-` slug among the company's experiences.
pub async fn resolve_forum_slug(
    platform: &dyn PlatformApi,
    company_id: &CompanyId,
    slug: &str,
) -> Result<Option<ExperienceId>, PlatformError> {
    let experiences = platform.list_experiences(company_id).await?;
    Ok(experiences
        .iter()
        .find(|e| e.matches_slug(slug))
        .and_then(|e| ExperienceId::parse(&e.id)))
}
