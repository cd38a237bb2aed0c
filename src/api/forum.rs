//! Forum API endpoints: platform listings, feeds and post composition.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use super::{
    company_candidates, header_value, parse_company_id, parse_experience_id, parse_forum_ref,
    success, ApiJson, ApiResult,
};
use crate::auth::{require_company_access, require_experience_access, UserToken};
use crate::errors::AppError;
use crate::models::{
    placeholder_post_id, validate_field_values, CompanyExperiences, CompanyId,
    ComposePostRequest, ComposePostResponse, ExperienceId, ExperienceSummary, ForumPost,
    ForumRef, NewForumPost, PostPage, SchemaField,
};
use crate::platform::{resolve_forum_slug, FEED_PAGE_SIZE};
use crate::resolver::{
    resolve_company, Attempt, ExperienceCandidates, ForumResolver, ForumTarget, Resolution,
    Source, Traced, EXPERIENCE_HEADER,
};
use crate::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyQuery {
    #[serde(default)]
    pub company_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumQuery {
    #[serde(default)]
    pub experience_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub experience_id: Option<String>,
}

/// Explicit forum chosen by the embedding page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumOverrideQuery {
    #[serde(default)]
    pub forum_exp_id: Option<String>,
    #[serde(default)]
    pub forum: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

impl ForumOverrideQuery {
    fn value(&self) -> Option<String> {
        [&self.forum_exp_id, &self.forum, &self.slug]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Resolved,
    Unresolved,
}

/// Posts of a resolved forum, or an empty unresolved feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub status: FeedStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience_id: Option<ExperienceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<CompanyId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub posts: Vec<ForumPost>,
    pub has_next_page: bool,
    pub attempts: Vec<Attempt>,
}

impl FeedResponse {
    fn unresolved(attempts: Vec<Attempt>) -> Self {
        Self {
            status: FeedStatus::Unresolved,
            experience_id: None,
            company_id: None,
            source: None,
            posts: Vec::new(),
            has_next_page: false,
            attempts,
        }
    }
}

/// What the compose form needs to render.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeContext {
    pub experience_id: ExperienceId,
    pub company_id: Option<CompanyId>,
    pub fields: Vec<SchemaField>,
}

/// GET /api/company-experiences?companyId= - Experiences of a company, minus this app's own.
pub async fn list_company_experiences(
    State(state): State<AppState>,
    Query(query): Query<CompanyQuery>,
) -> ApiResult<CompanyExperiences> {
    let company_id = parse_company_id(query.company_id.as_deref())?;
    let experiences = state.platform.list_experiences(&company_id).await?;
    let app_id = state.config.platform_app_id.as_deref();

    success(CompanyExperiences {
        company_id: company_id.to_string(),
        experiences: experiences
            .iter()
            .filter(|e| !app_id.is_some_and(|app| e.belongs_to_app(app)))
            .map(ExperienceSummary::from)
            .collect(),
    })
}

/// GET /api/company-forums?companyId= - Forum experiences of a company.
pub async fn list_company_forums(
    State(state): State<AppState>,
    Query(query): Query<CompanyQuery>,
) -> ApiResult<CompanyExperiences> {
    let company_id = parse_company_id(query.company_id.as_deref())?;
    let forums = state.platform.list_forums(&company_id).await?;

    success(CompanyExperiences {
        company_id: company_id.to_string(),
        experiences: forums.iter().map(ExperienceSummary::from).collect(),
    })
}

/// GET /api/forum?experienceId= - Posts of an explicit forum experience.
pub async fn list_forum_posts(
    State(state): State<AppState>,
    Query(query): Query<ForumQuery>,
) -> ApiResult<PostPage> {
    let experience_id = parse_experience_id(query.experience_id.as_deref())?;
    success(
        state
            .platform
            .list_forum_posts(&experience_id, FEED_PAGE_SIZE)
            .await?,
    )
}

/// GET /api/feed - Posts of whatever forum the request resolves to.
pub async fn get_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> ApiResult<FeedResponse> {
    success(resolved_feed(&state, None, query, &headers, &jar).await?)
}

/// GET /api/feed/{experienceId} - Same, with the route segment taking precedence.
pub async fn get_experience_feed(
    State(state): State<AppState>,
    Path(experience_id): Path<String>,
    Query(query): Query<FeedQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> ApiResult<FeedResponse> {
    success(resolved_feed(&state, Some(experience_id), query, &headers, &jar).await?)
}

/// GET /api/experiences/{experienceId}/forum - Forum view for an app experience.
pub async fn get_context_forum(
    State(state): State<AppState>,
    Path(experience_id): Path<String>,
    Query(query): Query<ForumOverrideQuery>,
    headers: HeaderMap,
    token: UserToken,
) -> ApiResult<FeedResponse> {
    let experience_id = parse_experience_id(Some(&experience_id))?;
    require_experience_access(state.platform.as_ref(), &token, &experience_id).await?;

    let company = owning_company(&state, &experience_id).await?;
    let candidates = ExperienceCandidates {
        header: header_value(&headers, EXPERIENCE_HEADER),
        query: query.value(),
        context_experience: Some(experience_id),
        ..Default::default()
    };

    let resolver = ForumResolver::new(
        &state.repo,
        state.platform.as_ref(),
        &state.config.experience_precedence,
    );
    let forum = resolver.resolve(&candidates, company.as_ref()).await;

    success(load_feed(&state, forum).await?)
}

/// GET /api/experiences/{experienceId}/compose - Schema fields for the compose form.
pub async fn get_compose_context(
    State(state): State<AppState>,
    Path(experience_id): Path<String>,
    token: UserToken,
) -> ApiResult<ComposeContext> {
    let experience_id = parse_experience_id(Some(&experience_id))?;
    require_experience_access(state.platform.as_ref(), &token, &experience_id).await?;

    let company_id = owning_company(&state, &experience_id).await?;
    let fields = match &company_id {
        Some(company_id) => state.repo.get_schema(company_id).await?.schema.fields,
        None => Vec::new(),
    };

    success(ComposeContext {
        experience_id,
        company_id,
        fields,
    })
}

/// POST /api/forum/{forumId}/posts - Create a forum post with custom field values.
///
/// When the platform does not return a post id the values are stored under a
/// placeholder id, to be attached later through the metadata endpoint.
pub async fn create_post(
    State(state): State<AppState>,
    Path(forum_id): Path<String>,
    token: UserToken,
    ApiJson(request): ApiJson<ComposePostRequest>,
) -> ApiResult<ComposePostResponse> {
    let forum = parse_forum_ref(Some(&forum_id), "forumId")?;
    let company_id = parse_company_id(request.company_id.as_deref())?;
    let title = request.title.as_deref().map(str::trim).unwrap_or_default();
    let content = request.content.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() || content.is_empty() {
        return Err(AppError::Validation(
            "title and content are required".to_string(),
        ));
    }
    let fields_data = request.fields_data.clone().unwrap_or_default();
    validate_field_values(&fields_data).map_err(AppError::Validation)?;

    let schema = state.repo.get_schema(&company_id).await?.schema;
    let missing = schema.missing_required(&fields_data);
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "Missing required field(s): {}",
            missing.join(", ")
        )));
    }

    let (user_id, _) = require_company_access(state.platform.as_ref(), &token, &company_id).await?;

    let experience_id = match forum {
        ForumRef::Experience(id) => Some(id),
        ForumRef::Slug(slug) => {
            match resolve_forum_slug(state.platform.as_ref(), &company_id, &slug).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!("Could not resolve forum slug {}: {}", slug, e);
                    None
                }
            }
        }
    };

    let created = match experience_id {
        Some(experience_id) => {
            let post = NewForumPost {
                experience_id: experience_id.to_string(),
                title: title.to_string(),
                content: content.to_string(),
                author_user_id: user_id.clone(),
            };
            match state.platform.create_forum_post(&post).await {
                Ok(created) => created,
                Err(e) => {
                    tracing::warn!("Forum post creation in {} failed: {}", experience_id, e);
                    None
                }
            }
        }
        None => None,
    };

    let (post_id, post_url) = match created {
        Some(created) => (created.post_id, created.post_url),
        None => (placeholder_post_id(), None),
    };
    let metadata = state
        .repo
        .create_metadata(&post_id, &company_id, &user_id, &fields_data)
        .await?;

    if metadata.is_placeholder() {
        tracing::info!(
            "Stored metadata {} for {} under placeholder {}",
            metadata.id,
            company_id,
            post_id
        );
    }

    success(ComposePostResponse {
        placeholder: metadata.is_placeholder(),
        post_id,
        post_url,
        metadata_id: metadata.id,
    })
}

async fn resolved_feed(
    state: &AppState,
    path: Option<String>,
    query: FeedQuery,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Result<FeedResponse, AppError> {
    let company = resolve_company(
        &company_candidates(state, headers, jar, None, query.company_id),
        &state.config.company_precedence,
    );

    // Only request-borne sources and the company's own binding apply here
    let order: Vec<Source> = state
        .config
        .experience_precedence
        .iter()
        .copied()
        .filter(|s| !matches!(s, Source::OwnerBinding | Source::Discovery))
        .collect();
    let candidates = ExperienceCandidates {
        path,
        header: header_value(headers, EXPERIENCE_HEADER),
        query: query.experience_id,
        referrer: header_value(headers, header::REFERER.as_str()),
        ..Default::default()
    };

    let resolver = ForumResolver::new(&state.repo, state.platform.as_ref(), &order);
    let forum = resolver.resolve(&candidates, company.value()).await;

    load_feed(state, forum).await
}

/// Company owning an experience, according to the platform.
async fn owning_company(
    state: &AppState,
    experience_id: &ExperienceId,
) -> Result<Option<CompanyId>, AppError> {
    let experience = state.platform.get_experience(experience_id).await?;
    let company = experience
        .as_ref()
        .and_then(|e| e.owner())
        .and_then(CompanyId::parse);
    if company.is_none() {
        tracing::warn!("Could not determine company of {}", experience_id);
    }
    Ok(company)
}

async fn load_feed(state: &AppState, forum: Traced<ForumTarget>) -> Result<FeedResponse, AppError> {
    let Traced {
        resolution,
        attempts,
    } = forum;
    let Resolution::Resolved { value, source } = resolution else {
        return Ok(FeedResponse::unresolved(attempts));
    };

    let page = state
        .platform
        .list_forum_posts(&value.experience_id, FEED_PAGE_SIZE)
        .await?;

    Ok(FeedResponse {
        status: FeedStatus::Resolved,
        experience_id: Some(value.experience_id),
        company_id: value.company_id,
        source: Some(source),
        posts: page.posts,
        has_next_page: page.has_next_page,
        attempts,
    })
}
