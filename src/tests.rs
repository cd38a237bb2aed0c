//! Integration tests for the forum bindings backend.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::{Config, LogFormat};
use crate::db::{init_database, Repository};
use crate::models::{
    AppRef, CompanyId, CompanyRef, CreatedPost, Experience, ExperienceId, ForumPost,
    NewForumPost, PostPage, UserProfile,
};
use crate::platform::{AccessCheck, AccessLevel, PlatformApi, PlatformError};
use crate::resolver::{DEFAULT_COMPANY_PRECEDENCE, DEFAULT_EXPERIENCE_PRECEDENCE};
use crate::{create_router, AppState};

// ==================== FAKE PLATFORM ====================

pub(crate) const COMPANY: &str = "biz_Acme1";
pub(crate) const OTHER_COMPANY: &str = "biz_Other2";
pub(crate) const ADMIN_TOKEN: &str = "admin-token";
pub(crate) const MEMBER_TOKEN: &str = "member-token";
pub(crate) const OUTSIDER_TOKEN: &str = "outsider-token";
/// The app's own experience inside COMPANY
pub(crate) const APP_EXPERIENCE: &str = "exp_App1";
/// COMPANY's forum, also reachable through the `forums-general` slug
pub(crate) const FORUM_EXPERIENCE: &str = "exp_Forum1";
pub(crate) const CHAT_EXPERIENCE: &str = "exp_Chat1";
const SELF_APP_ID: &str = "app_self";

/// In-process platform with two companies and three users.
#[derive(Default)]
pub(crate) struct FakePlatform {
    pub created_posts: Mutex<Vec<NewForumPost>>,
    /// Make experience listings fail as if the platform were down
    pub listings_down: AtomicBool,
    /// Make post listings hang for longer than any test timeout
    pub posts_stalled: AtomicBool,
}

impl FakePlatform {
    fn experiences() -> Vec<Experience> {
        let experience = |id: &str, app_name: &str, app_id: &str, route: Option<&str>| Experience {
            id: id.to_string(),
            name: Some(app_name.to_string()),
            company: Some(CompanyRef {
                id: COMPANY.to_string(),
            }),
            app: Some(AppRef {
                id: Some(app_id.to_string()),
                name: Some(app_name.to_string()),
            }),
            route: route.map(str::to_string),
            ..Default::default()
        };
        vec![
            experience(APP_EXPERIENCE, "Post Fields", SELF_APP_ID, None),
            experience(CHAT_EXPERIENCE, "Chat", "app_chat", Some("chat-lounge")),
            experience(FORUM_EXPERIENCE, "Forums", "app_forums", Some("forums-general")),
        ]
    }

    fn user_of(token: &str) -> Option<&'static str> {
        match token {
            ADMIN_TOKEN => Some("user_admin"),
            MEMBER_TOKEN => Some("user_member"),
            OUTSIDER_TOKEN => Some("user_outsider"),
            _ => None,
        }
    }

    fn level_of(user_id: &str, company_id: &str) -> AccessLevel {
        match (user_id, company_id) {
            ("user_admin", COMPANY) => AccessLevel::Admin,
            ("user_member", COMPANY) => AccessLevel::Member,
            _ => AccessLevel::None,
        }
    }

    fn listings(&self) -> Result<(), PlatformError> {
        if self.listings_down.load(Ordering::SeqCst) {
            return Err(PlatformError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn verify_user_token(&self, token: &str) -> Result<String, PlatformError> {
        Self::user_of(token)
            .map(str::to_string)
            .ok_or_else(|| PlatformError::InvalidToken("unknown token".to_string()))
    }

    async fn check_company_access(
        &self,
        user_id: &str,
        company_id: &CompanyId,
    ) -> Result<AccessCheck, PlatformError> {
        let level = Self::level_of(user_id, company_id.as_str());
        Ok(AccessCheck {
            has_access: level != AccessLevel::None,
            level,
        })
    }

    async fn check_experience_access(
        &self,
        user_id: &str,
        experience_id: &ExperienceId,
    ) -> Result<AccessCheck, PlatformError> {
        let known = Self::experiences()
            .iter()
            .any(|e| e.id == experience_id.as_str());
        let level = if known {
            Self::level_of(user_id, COMPANY)
        } else {
            AccessLevel::None
        };
        Ok(AccessCheck {
            has_access: level != AccessLevel::None,
            level,
        })
    }

    async fn list_experiences(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Experience>, PlatformError> {
        self.listings()?;
        if company_id.as_str() != COMPANY {
            return Ok(Vec::new());
        }
        Ok(Self::experiences())
    }

    async fn list_forums(&self, company_id: &CompanyId) -> Result<Vec<Experience>, PlatformError> {
        Ok(self
            .list_experiences(company_id)
            .await?
            .into_iter()
            .filter(|e| e.looks_like_forum())
            .collect())
    }

    async fn get_experience(
        &self,
        experience_id: &ExperienceId,
    ) -> Result<Option<Experience>, PlatformError> {
        Ok(Self::experiences()
            .into_iter()
            .find(|e| e.id == experience_id.as_str()))
    }

    async fn list_forum_posts(
        &self,
        experience_id: &ExperienceId,
        _limit: u32,
    ) -> Result<PostPage, PlatformError> {
        if self.posts_stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(PostPage {
            posts: vec![ForumPost {
                id: format!("post_in_{}", experience_id),
                title: Some("Hello".to_string()),
                ..Default::default()
            }],
            has_next_page: false,
        })
    }

    async fn create_forum_post(
        &self,
        post: &NewForumPost,
    ) -> Result<Option<CreatedPost>, PlatformError> {
        if let Ok(mut created) = self.created_posts.lock() {
            created.push(post.clone());
        }
        if post.experience_id == FORUM_EXPERIENCE {
            Ok(Some(CreatedPost {
                post_id: "post_new1".to_string(),
                post_url: Some("https://whop.com/forums/post_new1".to_string()),
            }))
        } else {
            Ok(None)
        }
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, PlatformError> {
        Ok((user_id == "user_admin").then(|| UserProfile {
            id: user_id.to_string(),
            name: Some("Ada Admin".to_string()),
            username: Some("ada".to_string()),
        }))
    }
}

// ==================== FIXTURE ====================

fn test_config(psk: Option<String>, db_path: &Path) -> Config {
    Config {
        api_psk: psk,
        db_path: db_path.to_path_buf(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".to_string(),
        log_format: LogFormat::Pretty,
        request_timeout: Duration::from_secs(30),
        default_company_id: None,
        company_precedence: DEFAULT_COMPANY_PRECEDENCE.to_vec(),
        experience_precedence: DEFAULT_EXPERIENCE_PRECEDENCE.to_vec(),
        platform_base_url: "http://127.0.0.1:9".to_string(),
        platform_api_key: None,
        platform_app_id: Some(SELF_APP_ID.to_string()),
        platform_timeout: Duration::from_secs(10),
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Arc<Repository>,
    platform: Arc<FakePlatform>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));
        let platform = Arc::new(FakePlatform::default());

        let mut config = test_config(Some("test-api-key".to_string()), &db_path);
        adjust(&mut config);
        let psk = config.api_psk.clone();

        let state = AppState {
            repo: repo.clone(),
            platform: platform.clone(),
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            repo,
            platform,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn get_as(&self, path: &str, token: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(self.url(path))
            .header("x-whop-user-token", token)
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn send_as(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut request = self.client.request(method, self.url(path));
        if let Some(token) = token {
            request = request.header("x-whop-user-token", token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request.send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn bind(&self, company_id: &str, forum_id: &str, token: &str) -> (u16, Value) {
        self.send_as(
            reqwest::Method::POST,
            &format!("/api/bindings/{}", company_id),
            Some(token),
            Some(json!({ "forumId": forum_id })),
        )
        .await
    }

    async fn active_forum(&self, company_id: &str) -> Option<String> {
        self.repo
            .find_active_binding(&CompanyId::parse(company_id).unwrap())
            .await
            .unwrap()
            .map(|b| b.forum_id)
    }
}

// ==================== SERVICE AUTH ====================

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::new().await;

    // Request without API key
    let resp = Client::new()
        .get(fixture.url(&format!("/api/bindings/{}", COMPANY)))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_auth_invalid_psk() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url(&format!("/api/bindings/{}", COMPANY)))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = Client::new()
        .get(fixture.url(&format!("/api/bindings/{}", COMPANY)))
        .header("authorization", "Bearer test-api-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_no_psk_configured_allows_requests() {
    let fixture = TestFixture::with_config(|c| c.api_psk = None).await;

    let (status, body) = fixture.get(&format!("/api/bindings/{}", COMPANY)).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!([]));
}

// ==================== BINDINGS ====================

#[tokio::test]
async fn test_bind_is_idempotent() {
    let fixture = TestFixture::new().await;

    let (status, first) = fixture.bind(COMPANY, "exp_1", ADMIN_TOKEN).await;
    assert_eq!(status, 200);
    assert_eq!(first["data"]["companyId"], COMPANY);
    assert_eq!(first["data"]["forumId"], "exp_1");
    assert_eq!(first["data"]["enabled"], true);

    let (status, second) = fixture.bind(COMPANY, "exp_1", ADMIN_TOKEN).await;
    assert_eq!(status, 200);
    assert_eq!(first["data"]["id"], second["data"]["id"]);

    let (_, list) = fixture.get(&format!("/api/bindings/{}", COMPANY)).await;
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rebind_swaps_active_forum() {
    let fixture = TestFixture::new().await;

    fixture.bind(COMPANY, "exp_1", ADMIN_TOKEN).await;
    let (status, _) = fixture
        .send_as(
            reqwest::Method::POST,
            "/api/bindings",
            Some(ADMIN_TOKEN),
            Some(json!({ "companyId": COMPANY, "experienceId": "exp_2" })),
        )
        .await;
    assert_eq!(status, 200);

    let (_, active) = fixture
        .get(&format!("/api/bindings/{}/active", COMPANY))
        .await;
    assert_eq!(active["data"]["forumId"], "exp_2");

    let (_, by_old_forum) = fixture.get("/api/bindings?experienceId=exp_1").await;
    assert_eq!(by_old_forum["data"], json!([]));

    let (_, by_new_forum) = fixture.get("/api/bindings?experienceId=exp_2").await;
    assert_eq!(by_new_forum["data"][0]["companyId"], COMPANY);
}

#[tokio::test]
async fn test_unbind() {
    let fixture = TestFixture::new().await;

    // Nothing bound yet: still a success
    let (status, body) = fixture
        .send_as(
            reqwest::Method::DELETE,
            &format!("/api/bindings/{}?forumId=exp_1", COMPANY),
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["ok"], true);
    assert_eq!(body["data"]["disabled"], 0);

    fixture.bind(COMPANY, "exp_1", ADMIN_TOKEN).await;
    let (_, body) = fixture
        .send_as(
            reqwest::Method::DELETE,
            &format!("/api/bindings/{}?forumId=exp_1", COMPANY),
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
    assert_eq!(body["data"]["disabled"], 1);

    let (_, active) = fixture
        .get(&format!("/api/bindings/{}/active", COMPANY))
        .await;
    assert!(active["data"].is_null());
}

#[tokio::test]
async fn test_non_admin_cannot_change_bindings() {
    let fixture = TestFixture::new().await;
    fixture.bind(COMPANY, "exp_1", ADMIN_TOKEN).await;

    let (status, body) = fixture.bind(COMPANY, "exp_2", MEMBER_TOKEN).await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    assert_eq!(fixture.active_forum(COMPANY).await.as_deref(), Some("exp_1"));

    let (status, _) = fixture
        .send_as(
            reqwest::Method::DELETE,
            &format!("/api/bindings/{}?forumId=exp_1", COMPANY),
            Some(MEMBER_TOKEN),
            None,
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(fixture.active_forum(COMPANY).await.as_deref(), Some("exp_1"));

    // Admin of one company is nobody in another
    let (status, _) = fixture.bind(OTHER_COMPANY, "exp_9", ADMIN_TOKEN).await;
    assert_eq!(status, 403);
    assert!(fixture.active_forum(OTHER_COMPANY).await.is_none());
}

#[tokio::test]
async fn test_bind_requires_user_token() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .send_as(
            reqwest::Method::POST,
            &format!("/api/bindings/{}", COMPANY),
            None,
            Some(json!({ "forumId": "exp_1" })),
        )
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = fixture.bind(COMPANY, "exp_1", "forged-token").await;
    assert_eq!(status, 401);
    assert!(fixture.active_forum(COMPANY).await.is_none());
}

#[tokio::test]
async fn test_invalid_identifiers_rejected_before_auth() {
    let fixture = TestFixture::new().await;

    // No user token at all: validation still wins
    let (status, body) = fixture
        .send_as(
            reqwest::Method::POST,
            "/api/bindings/company123",
            None,
            Some(json!({ "forumId": "exp_1" })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");

    let (status, _) = fixture.bind(COMPANY, "not-a-forum", ADMIN_TOKEN).await;
    assert_eq!(status, 400);

    let (status, _) = fixture.get("/api/bindings").await;
    assert_eq!(status, 400);

    let (status, _) = fixture.get("/api/bindings/undefined/active").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/bindings/{}", COMPANY)))
        .header("x-whop-user-token", ADMIN_TOKEN)
        .header("content-type", "application/json")
        .body("{\"forumId\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    // Nothing was written
    assert!(fixture.active_forum(COMPANY).await.is_none());
}

#[tokio::test]
async fn test_bind_legacy_slug() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.bind(COMPANY, "forums-general", ADMIN_TOKEN).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["forumId"], "forums-general");
}

// ==================== SCHEMA ====================

#[tokio::test]
async fn test_schema_roundtrip() {
    let fixture = TestFixture::new().await;

    let (status, empty) = fixture.get(&format!("/api/schema/{}", COMPANY)).await;
    assert_eq!(status, 200);
    assert_eq!(empty["data"]["schema"]["fields"], json!([]));
    assert!(empty["data"]["updatedAt"].is_null());

    let (status, saved) = fixture
        .send_as(
            reqwest::Method::PUT,
            &format!("/api/schema/{}", COMPANY),
            Some(ADMIN_TOKEN),
            Some(json!({
                "schema": {
                    "fields": [
                        { "key": "color", "label": "Color", "type": "select", "options": ["red", "blue"] },
                        { "key": "color", "label": "Again", "type": "text" },
                        { "key": "", "label": "Nameless" }
                    ]
                }
            })),
        )
        .await;
    assert_eq!(status, 200);
    assert!(saved["data"]["updatedAt"].is_string());

    let (_, stored) = fixture.get(&format!("/api/schema/{}", COMPANY)).await;
    let fields = stored["data"]["schema"]["fields"].as_array().unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0]["key"], "color");
    assert_eq!(fields[0]["label"], "Color");
    assert_eq!(fields[0]["type"], "select");
    assert_eq!(fields[0]["options"], json!(["red", "blue"]));
}

#[tokio::test]
async fn test_schema_save_requires_admin() {
    let fixture = TestFixture::new().await;

    let (status, _) = fixture
        .send_as(
            reqwest::Method::PUT,
            &format!("/api/schema/{}", COMPANY),
            Some(MEMBER_TOKEN),
            Some(json!({ "schema": { "fields": [{ "key": "a" }] } })),
        )
        .await;
    assert_eq!(status, 403);

    let (status, _) = fixture
        .send_as(
            reqwest::Method::PUT,
            &format!("/api/schema/{}", COMPANY),
            Some(ADMIN_TOKEN),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, 400);

    let (_, stored) = fixture.get(&format!("/api/schema/{}", COMPANY)).await;
    assert_eq!(stored["data"]["schema"]["fields"], json!([]));
}

// ==================== METADATA ====================

#[tokio::test]
async fn test_placeholder_metadata_attach() {
    let fixture = TestFixture::new().await;
    let data = json!({ "color": "red", "size": 3 });

    let (status, created) = fixture
        .send_as(
            reqwest::Method::POST,
            "/api/post-metadata",
            Some(MEMBER_TOKEN),
            Some(json!({ "postId": "temp_1700000000000", "companyId": COMPANY, "data": data })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(created["data"]["placeholder"], true);
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, attached) = fixture
        .send_as(
            reqwest::Method::PATCH,
            &format!("/api/post-metadata/{}", id),
            Some(MEMBER_TOKEN),
            Some(json!({ "postId": "post_abc" })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(attached["data"]["postId"], "post_abc");
    assert_eq!(attached["data"]["data"], data);

    let (_, by_post) = fixture.get("/api/post-metadata?postId=post_abc").await;
    assert_eq!(by_post["data"]["id"], id.as_str());
    assert_eq!(by_post["data"]["data"], data);
    assert_eq!(by_post["data"]["createdByUserId"], "user_member");

    // Re-attaching the same post is a no-op, a different one conflicts
    let (status, _) = fixture
        .send_as(
            reqwest::Method::PATCH,
            &format!("/api/post-metadata/{}", id),
            Some(MEMBER_TOKEN),
            Some(json!({ "postId": "post_abc" })),
        )
        .await;
    assert_eq!(status, 200);

    let (status, body) = fixture
        .send_as(
            reqwest::Method::PATCH,
            &format!("/api/post-metadata/{}", id),
            Some(MEMBER_TOKEN),
            Some(json!({ "postUrl": "https://whop.com/forums/post_other" })),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_metadata_without_post_gets_placeholder() {
    let fixture = TestFixture::new().await;

    let (status, created) = fixture
        .send_as(
            reqwest::Method::POST,
            "/api/post-metadata",
            Some(MEMBER_TOKEN),
            Some(json!({ "companyId": COMPANY, "data": { "agree": true } })),
        )
        .await;
    assert_eq!(status, 200);
    assert!(created["data"]["postId"]
        .as_str()
        .unwrap()
        .starts_with("temp_"));

    // The dashboard counts records still waiting for their post
    let (_, body) = fixture
        .get(&format!("/api/dashboard/{}/context", COMPANY))
        .await;
    assert_eq!(body["data"]["pendingAttachments"], 1);
}

#[tokio::test]
async fn test_metadata_access_and_validation() {
    let fixture = TestFixture::new().await;

    let (status, _) = fixture
        .send_as(
            reqwest::Method::POST,
            "/api/post-metadata",
            Some(OUTSIDER_TOKEN),
            Some(json!({ "postId": "post_1", "companyId": COMPANY, "data": {} })),
        )
        .await;
    assert_eq!(status, 403);

    let (status, body) = fixture
        .send_as(
            reqwest::Method::POST,
            "/api/post-metadata",
            Some(MEMBER_TOKEN),
            Some(json!({ "postId": "post_1", "companyId": COMPANY, "data": { "tags": ["a"] } })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");

    let (status, _) = fixture
        .send_as(
            reqwest::Method::PATCH,
            "/api/post-metadata/missing-id",
            Some(MEMBER_TOKEN),
            Some(json!({ "postId": "post_1" })),
        )
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_metadata_lookups_return_null() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get("/api/post-metadata?postId=post_nothing").await;
    assert_eq!(status, 200);
    assert!(body["data"].is_null());

    let (status, body) = fixture.get("/api/post-metadata/no-such-record").await;
    assert_eq!(status, 200);
    assert!(body["data"].is_null());

    let (status, _) = fixture.get("/api/post-metadata").await;
    assert_eq!(status, 400);
}

// ==================== FEEDS ====================

#[tokio::test]
async fn test_feed_unresolved() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get("/api/feed").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "unresolved");
    assert_eq!(body["data"]["posts"], json!([]));
}

#[tokio::test]
async fn test_feed_resolves_through_binding() {
    let fixture = TestFixture::new().await;
    fixture.bind(COMPANY, FORUM_EXPERIENCE, ADMIN_TOKEN).await;

    let (status, body) = fixture
        .get(&format!("/api/feed?companyId={}", COMPANY))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "resolved");
    assert_eq!(body["data"]["source"], "binding");
    assert_eq!(body["data"]["experienceId"], FORUM_EXPERIENCE);
    assert_eq!(body["data"]["companyId"], COMPANY);
    assert_eq!(
        body["data"]["posts"][0]["id"],
        format!("post_in_{}", FORUM_EXPERIENCE)
    );
}

#[tokio::test]
async fn test_feed_header_beats_binding() {
    let fixture = TestFixture::new().await;
    fixture.bind(COMPANY, FORUM_EXPERIENCE, ADMIN_TOKEN).await;

    let resp = fixture
        .client
        .get(fixture.url("/api/feed"))
        .header("x-whop-company-id", COMPANY)
        .header("x-whop-experience-id", CHAT_EXPERIENCE)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["source"], "header");
    assert_eq!(body["data"]["experienceId"], CHAT_EXPERIENCE);
}

#[tokio::test]
async fn test_feed_from_referrer() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/feed"))
        .header("referer", "https://whop.com/hub/exp_Ref9/app?x=1")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["source"], "referrer");
    assert_eq!(body["data"]["experienceId"], "exp_Ref9");
}

#[tokio::test]
async fn test_feed_path_beats_header() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/feed/{}", FORUM_EXPERIENCE)))
        .header("x-whop-experience-id", CHAT_EXPERIENCE)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["source"], "path");
    assert_eq!(body["data"]["experienceId"], FORUM_EXPERIENCE);

    // An unrendered route template falls through to the header
    let resp = fixture
        .client
        .get(fixture.url("/api/feed/%5BexperienceId%5D"))
        .header("x-whop-experience-id", CHAT_EXPERIENCE)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["source"], "header");
    assert_eq!(body["data"]["attempts"][0]["source"], "path");
    assert_eq!(body["data"]["attempts"][0]["outcome"], "rejected");
}

#[tokio::test]
async fn test_forum_listing_requires_experience_id() {
    let fixture = TestFixture::new().await;

    let (status, _) = fixture.get("/api/forum").await;
    assert_eq!(status, 400);

    let (status, body) = fixture
        .get(&format!("/api/forum?experienceId={}", FORUM_EXPERIENCE))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["hasNextPage"], false);
    assert_eq!(body["data"]["posts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_timeout_uses_error_envelope() {
    let fixture =
        TestFixture::with_config(|c| c.request_timeout = Duration::from_millis(200)).await;
    fixture.platform.posts_stalled.store(true, Ordering::SeqCst);

    let (status, body) = fixture
        .get(&format!("/api/forum?experienceId={}", FORUM_EXPERIENCE))
        .await;
    assert_eq!(status, 408);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "REQUEST_TIMEOUT");
    assert_eq!(body["error"]["details"]["retryable"], true);
}

#[tokio::test]
async fn test_context_forum_resolution() {
    let fixture = TestFixture::new().await;
    let path = format!("/api/experiences/{}/forum", APP_EXPERIENCE);

    // No binding: discovery finds the forum-like experience
    let (status, body) = fixture.get_as(&path, MEMBER_TOKEN).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["source"], "discovery");
    assert_eq!(body["data"]["experienceId"], FORUM_EXPERIENCE);
    assert_eq!(body["data"]["companyId"], COMPANY);

    // A bound legacy slug is resolved to its canonical id
    fixture.bind(COMPANY, "forums-general", ADMIN_TOKEN).await;
    let (_, body) = fixture.get_as(&path, MEMBER_TOKEN).await;
    assert_eq!(body["data"]["source"], "binding");
    assert_eq!(body["data"]["experienceId"], FORUM_EXPERIENCE);

    // An explicit override wins
    let (_, body) = fixture
        .get_as(
            &format!("{}?forumExpId={}", path, CHAT_EXPERIENCE),
            MEMBER_TOKEN,
        )
        .await;
    assert_eq!(body["data"]["source"], "query");
    assert_eq!(body["data"]["experienceId"], CHAT_EXPERIENCE);

    let (status, _) = fixture.get_as(&path, OUTSIDER_TOKEN).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_context_forum_ignores_embedding_experience() {
    let fixture = TestFixture::new().await;
    fixture.bind(COMPANY, FORUM_EXPERIENCE, ADMIN_TOKEN).await;

    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/experiences/{}/forum", APP_EXPERIENCE)))
        .header("x-whop-user-token", MEMBER_TOKEN)
        .header("x-whop-experience-id", APP_EXPERIENCE)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["source"], "binding");
    assert_eq!(body["data"]["experienceId"], FORUM_EXPERIENCE);

    let attempts = body["data"]["attempts"].as_array().unwrap();
    assert!(attempts
        .iter()
        .any(|a| a["source"] == "header" && a["outcome"] == "rejected"));
}

#[tokio::test]
async fn test_context_forum_survives_platform_outage() {
    let fixture = TestFixture::new().await;
    fixture.platform.listings_down.store(true, Ordering::SeqCst);

    let (status, body) = fixture
        .get_as(
            &format!("/api/experiences/{}/forum", APP_EXPERIENCE),
            MEMBER_TOKEN,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "unresolved");
    let attempts = body["data"]["attempts"].as_array().unwrap();
    assert!(attempts
        .iter()
        .any(|a| a["source"] == "discovery" && a["outcome"] == "failed"));
}

// ==================== COMPOSE ====================

#[tokio::test]
async fn test_compose_context_lists_schema_fields() {
    let fixture = TestFixture::new().await;
    fixture
        .send_as(
            reqwest::Method::PUT,
            &format!("/api/schema/{}", COMPANY),
            Some(ADMIN_TOKEN),
            Some(json!({ "schema": { "fields": [{ "key": "size", "type": "number", "required": true }] } })),
        )
        .await;

    let (status, body) = fixture
        .get_as(
            &format!("/api/experiences/{}/compose", APP_EXPERIENCE),
            MEMBER_TOKEN,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["companyId"], COMPANY);
    assert_eq!(body["data"]["fields"][0]["key"], "size");
    assert_eq!(body["data"]["fields"][0]["required"], true);
}

#[tokio::test]
async fn test_create_post_on_platform() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .send_as(
            reqwest::Method::POST,
            "/api/forum/forums-general/posts",
            Some(MEMBER_TOKEN),
            Some(json!({
                "companyId": COMPANY,
                "title": "Hello",
                "content": "World",
                "fieldsData": { "color": "red" }
            })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["postId"], "post_new1");
    assert_eq!(body["data"]["placeholder"], false);

    let created = fixture.platform.created_posts.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].experience_id, FORUM_EXPERIENCE);
    assert_eq!(created[0].author_user_id, "user_member");

    let (_, metadata) = fixture.get("/api/post-metadata?postId=post_new1").await;
    assert_eq!(metadata["data"]["data"]["color"], "red");
}

#[tokio::test]
async fn test_create_post_falls_back_to_placeholder() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .send_as(
            reqwest::Method::POST,
            &format!("/api/forum/{}/posts", CHAT_EXPERIENCE),
            Some(MEMBER_TOKEN),
            Some(json!({ "companyId": COMPANY, "title": "Hi", "content": "There" })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["placeholder"], true);
    assert!(body["data"]["postId"].as_str().unwrap().starts_with("temp_"));

    let metadata_id = body["data"]["metadataId"].as_str().unwrap();
    let (_, stored) = fixture
        .get(&format!("/api/post-metadata/{}", metadata_id))
        .await;
    assert_eq!(stored["data"]["companyId"], COMPANY);
}

#[tokio::test]
async fn test_create_post_validation() {
    let fixture = TestFixture::new().await;
    fixture
        .send_as(
            reqwest::Method::PUT,
            &format!("/api/schema/{}", COMPANY),
            Some(ADMIN_TOKEN),
            Some(json!({ "schema": { "fields": [{ "key": "size", "required": true }] } })),
        )
        .await;

    let (status, body) = fixture
        .send_as(
            reqwest::Method::POST,
            &format!("/api/forum/{}/posts", FORUM_EXPERIENCE),
            Some(MEMBER_TOKEN),
            Some(json!({ "companyId": COMPANY, "title": "Hi", "content": "There", "fieldsData": {} })),
        )
        .await;
    assert_eq!(status, 400);
    assert!(body["error"]["message"].as_str().unwrap().contains("size"));

    let (status, _) = fixture
        .send_as(
            reqwest::Method::POST,
            &format!("/api/forum/{}/posts", FORUM_EXPERIENCE),
            Some(OUTSIDER_TOKEN),
            Some(json!({ "companyId": COMPANY, "title": "Hi", "content": "There", "fieldsData": { "size": "L" } })),
        )
        .await;
    assert_eq!(status, 403);
    assert!(fixture.platform.created_posts.lock().unwrap().is_empty());
}

// ==================== PLATFORM LISTINGS ====================

#[tokio::test]
async fn test_company_experiences_hide_own_app() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .get(&format!("/api/company-experiences?companyId={}", COMPANY))
        .await;
    assert_eq!(status, 200);
    let ids: Vec<_> = body["data"]["experiences"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec![CHAT_EXPERIENCE, FORUM_EXPERIENCE]);

    let (_, forums) = fixture
        .get(&format!("/api/company-forums?companyId={}", COMPANY))
        .await;
    assert_eq!(forums["data"]["experiences"][0]["id"], FORUM_EXPERIENCE);
    assert_eq!(forums["data"]["experiences"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_platform_outage_is_upstream_error() {
    let fixture = TestFixture::new().await;
    fixture.platform.listings_down.store(true, Ordering::SeqCst);

    let (status, body) = fixture
        .get(&format!("/api/company-experiences?companyId={}", COMPANY))
        .await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "UPSTREAM_UNAVAILABLE");
    assert_eq!(body["error"]["details"]["retryable"], true);
}

// ==================== DASHBOARD ====================

#[tokio::test]
async fn test_dashboard_company_cookie() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/dashboard/company"))
        .json(&json!({ "input": "https://whop.com/dashboard/biz_Acme1/apps" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let cookie = resp
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.contains("ff_company_id=biz_Acme1"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=86400"));

    let resp = fixture
        .client
        .get(fixture.url("/api/dashboard/context"))
        .header("cookie", "ff_company_id=biz_Acme1")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["status"], "resolved");
    assert_eq!(body["data"]["value"], COMPANY);
    assert_eq!(body["data"]["source"], "cookie");

    let (status, _) = fixture
        .send_as(
            reqwest::Method::POST,
            "/api/dashboard/company",
            None,
            Some(json!({ "input": "no company here" })),
        )
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_dashboard_path_beats_query_and_header() {
    let fixture = TestFixture::new().await;
    fixture.bind(COMPANY, FORUM_EXPERIENCE, ADMIN_TOKEN).await;

    let resp = fixture
        .client
        .get(fixture.url(&format!(
            "/api/dashboard/{}/context?companyId=biz_BBB",
            COMPANY
        )))
        .header("x-whop-company-id", "biz_CCC")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["value"], COMPANY);
    assert_eq!(body["data"]["source"], "path");
    assert_eq!(body["data"]["activeBinding"]["forumId"], FORUM_EXPERIENCE);

    // An unrendered template in the path falls through to the query
    let (_, body) = fixture
        .get("/api/dashboard/%5BcompanyId%5D/context?companyId=biz_BBB")
        .await;
    assert_eq!(body["data"]["value"], "biz_BBB");
    assert_eq!(body["data"]["source"], "query");
    assert_eq!(body["data"]["attempts"][0]["outcome"], "rejected");
}

#[tokio::test]
async fn test_dashboard_default_company() {
    let fixture =
        TestFixture::with_config(|c| c.default_company_id = Some(COMPANY.to_string())).await;

    let (_, body) = fixture.get("/api/dashboard/context").await;
    assert_eq!(body["data"]["source"], "environment");
    assert_eq!(body["data"]["value"], COMPANY);

    let fixture = TestFixture::new().await;
    let (status, body) = fixture.get("/api/dashboard/context").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "unresolved");
    assert!(body["data"]["activeBinding"].is_null());
    assert_eq!(body["data"]["pendingAttachments"], 0);
}

#[tokio::test]
async fn test_me() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get_as("/api/me", ADMIN_TOKEN).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["id"], "user_admin");
    assert_eq!(body["data"]["name"], "Ada Admin");

    let (_, body) = fixture.get_as("/api/me", MEMBER_TOKEN).await;
    assert_eq!(body["data"]["id"], "user_member");

    let (status, _) = fixture.get("/api/me").await;
    assert_eq!(status, 401);
}
