//! HTTP client for the host platform REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{AccessCheck, AccessLevel, PlatformApi, PlatformError};
use crate::models::{
    CompanyId, CreatedPost, Experience, ExperienceId, ForumPost, NewForumPost, PostPage,
    UserProfile,
};

/// Header carrying the end user's token, forwarded by the platform's embed proxy.
pub const USER_TOKEN_HEADER: &str = "x-whop-user-token";
/// Header selecting the user a write is performed for.
const ON_BEHALF_OF_HEADER: &str = "x-on-behalf-of";
const LIST_PAGE_SIZE: &str = "50";
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default, alias = "items")]
    data: Vec<T>,
    #[serde(default, alias = "pageInfo")]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct PageInfo {
    #[serde(default, alias = "hasNextPage")]
    has_next_page: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ForumEntry {
    #[serde(default)]
    experience: Option<Experience>,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(alias = "user_id", alias = "userId")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    #[serde(default, alias = "hasAccess")]
    has_access: bool,
    #[serde(default, alias = "accessLevel")]
    access_level: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatePostBody<'a> {
    experience_id: &'a str,
    title: &'a str,
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct PostRef {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    #[serde(default, alias = "post_id", alias = "postId")]
    id: Option<String>,
    #[serde(default, alias = "post_url", alias = "postUrl")]
    url: Option<String>,
    #[serde(default)]
    post: Option<PostRef>,
}

/// [`PlatformApi`] over the platform's REST endpoints, authenticated with the app API key.
#[derive(Clone)]
pub struct HttpPlatformClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpPlatformClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PlatformError::Unavailable(format!("invalid base url: {}", e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Unavailable(e.to_string()))?;

        if api_key.is_none() {
            tracing::warn!("No platform API key configured (PLATFORM_API_KEY). Platform calls will fail!");
        }

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PlatformError::Unavailable("base url cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, PlatformError> {
        let key = self.api_key.as_deref().ok_or(PlatformError::NotConfigured)?;
        Ok(builder.bearer_auth(key))
    }

    /// Send a request; `Ok(None)` on 404.
    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<Option<T>, PlatformError> {
        let response = self
            .authorized(builder)?
            .send()
            .await
            .map_err(|e| PlatformError::Unavailable(e.without_url().to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            return Err(PlatformError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| PlatformError::Decode(e.without_url().to_string()))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Option<T>, PlatformError> {
        let url = self.endpoint(segments)?;
        self.send(self.client.get(url).query(query)).await
    }

    async fn check_access(
        &self,
        user_id: &str,
        resource_id: &str,
    ) -> Result<AccessCheck, PlatformError> {
        let access: Option<AccessResponse> =
            self.get(&["users", user_id, "access", resource_id], &[]).await?;
        Ok(match access {
            Some(a) => AccessCheck {
                has_access: a.has_access,
                level: if a.has_access {
                    a.access_level
                        .as_deref()
                        .map(AccessLevel::from_platform)
                        .unwrap_or(AccessLevel::Member)
                } else {
                    AccessLevel::None
                },
            },
            None => AccessCheck {
                has_access: false,
                level: AccessLevel::None,
            },
        })
    }
}

#[async_trait]
impl PlatformApi for HttpPlatformClient {
    async fn verify_user_token(&self, token: &str) -> Result<String, PlatformError> {
        if token.trim().is_empty() {
            return Err(PlatformError::InvalidToken("empty token".to_string()));
        }
        let url = self.endpoint(&["me"])?;
        let request = self.client.get(url).header(USER_TOKEN_HEADER, token);
        match self.send::<MeResponse>(request).await {
            Ok(Some(me)) => Ok(me.id),
            Ok(None) => Err(PlatformError::InvalidToken("unknown user".to_string())),
            Err(PlatformError::Status { status, message }) if status == 401 || status == 403 => {
                Err(PlatformError::InvalidToken(message))
            }
            Err(e) => Err(e),
        }
    }

    async fn check_company_access(
        &self,
        user_id: &str,
        company_id: &CompanyId,
    ) -> Result<AccessCheck, PlatformError> {
        self.check_access(user_id, company_id.as_str()).await
    }

    async fn check_experience_access(
        &self,
        user_id: &str,
        experience_id: &ExperienceId,
    ) -> Result<AccessCheck, PlatformError> {
        self.check_access(user_id, experience_id.as_str()).await
    }

    async fn list_experiences(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Experience>, PlatformError> {
        let list: Option<ListResponse<Experience>> = self
            .get(
                &["experiences"],
                &[("company_id", company_id.as_str()), ("first", LIST_PAGE_SIZE)],
            )
            .await?;
        Ok(list.map(|l| l.data).unwrap_or_default())
    }

    async fn list_forums(&self, company_id: &CompanyId) -> Result<Vec<Experience>, PlatformError> {
        let list: Option<ListResponse<ForumEntry>> = self
            .get(
                &["forums"],
                &[("company_id", company_id.as_str()), ("first", LIST_PAGE_SIZE)],
            )
            .await?;
        Ok(list
            .map(|l| l.data)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|f| f.experience)
            .filter(|e| !e.id.is_empty())
            .collect())
    }

    async fn get_experience(
        &self,
        experience_id: &ExperienceId,
    ) -> Result<Option<Experience>, PlatformError> {
        self.get(&["experiences", experience_id.as_str()], &[]).await
    }

    async fn list_forum_posts(
        &self,
        experience_id: &ExperienceId,
        limit: u32,
    ) -> Result<PostPage, PlatformError> {
        let limit = limit.to_string();
        let list: Option<ListResponse<ForumPost>> = self
            .get(
                &["forum_posts"],
                &[("experience_id", experience_id.as_str()), ("limit", limit.as_str())],
            )
            .await?;
        Ok(list
            .map(|l| PostPage {
                posts: l.data.into_iter().filter(|p| !p.id.is_empty()).collect(),
                has_next_page: l.page_info.unwrap_or_default().has_next_page,
            })
            .unwrap_or_default())
    }

    async fn create_forum_post(
        &self,
        post: &NewForumPost,
    ) -> Result<Option<CreatedPost>, PlatformError> {
        let url = self.endpoint(&["forum_posts"])?;
        // the title is repeated in the body for forums that ignore it
        let content = if post.title.is_empty() {
            post.content.clone()
        } else {
            format!("{}\n\n{}", post.title, post.content)
        };
        let body = CreatePostBody {
            experience_id: &post.experience_id,
            title: &post.title,
            content,
        };
        let request = self
            .client
            .post(url)
            .header(ON_BEHALF_OF_HEADER, &post.author_user_id)
            .json(&body);

        let created: Option<CreatePostResponse> = self.send(request).await?;
        Ok(created.and_then(|c| {
            let nested = c.post.unwrap_or_default();
            let post_id = c.id.or(nested.id).filter(|id| !id.is_empty())?;
            Some(CreatedPost {
                post_id,
                post_url: c.url.or(nested.url),
            })
        }))
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, PlatformError> {
        self.get(&["users", user_id], &[]).await
    }
}
