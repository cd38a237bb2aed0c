//! Company and forum resolution.
//!
//! A request can name its company or forum in several places: the URL path,
//! query strings, pasted links, trusted platform headers, a cookie, the
//! referrer, or stored bindings. Resolution walks those sources in a
//! configured order, normalizes each candidate and returns the first valid
//! one together with a trace of every step that was tried.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::db::Repository;
use crate::models::{CompanyId, ExperienceId, ForumRef};
use crate::platform::{resolve_forum_slug, PlatformApi};

/// Trusted header carrying the company of an embedded dashboard view.
pub const COMPANY_HEADER: &str = "x-whop-company-id";
/// Trusted header carrying the experience of an embedded app view.
pub const EXPERIENCE_HEADER: &str = "x-whop-experience-id";
/// Cookie remembering the company a dashboard user pasted.
pub const COMPANY_COOKIE: &str = "ff_company_id";

static COMPANY_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"biz_[A-Za-z0-9]+").expect("Invalid regex pattern for company id")
});

static EXPERIENCE_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"exp_[A-Za-z0-9]+").expect("Invalid regex pattern for experience id")
});

/// Where a candidate identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Path,
    Query,
    Pasted,
    Header,
    Cookie,
    Referrer,
    Environment,
    /// Active binding of the already resolved company
    Binding,
    /// Active binding of the company owning the context experience
    OwnerBinding,
    /// First forum-like experience of the company
    Discovery,
}

pub const DEFAULT_COMPANY_PRECEDENCE: &[Source] = &[
    Source::Path,
    Source::Query,
    Source::Pasted,
    Source::Header,
    Source::Cookie,
    Source::Environment,
];

pub const DEFAULT_EXPERIENCE_PRECEDENCE: &[Source] = &[
    Source::Path,
    Source::Header,
    Source::Query,
    Source::Referrer,
    Source::Binding,
    Source::OwnerBinding,
    Source::Discovery,
];

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Source::Path => "path",
            Source::Query => "query",
            Source::Pasted => "pasted",
            Source::Header => "header",
            Source::Cookie => "cookie",
            Source::Referrer => "referrer",
            Source::Environment => "environment",
            Source::Binding => "binding",
            Source::OwnerBinding => "owner-binding",
            Source::Discovery => "discovery",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let source = match name.trim().to_ascii_lowercase().as_str() {
            "path" => Source::Path,
            "query" => Source::Query,
            "pasted" => Source::Pasted,
            "header" => Source::Header,
            "cookie" => Source::Cookie,
            "referrer" | "referer" => Source::Referrer,
            "environment" | "env" => Source::Environment,
            "binding" => Source::Binding,
            "owner-binding" => Source::OwnerBinding,
            "discovery" => Source::Discovery,
            _ => return None,
        };
        Some(source)
    }

    /// Sources holding arbitrary text (URLs, pasted links) rather than a bare id.
    pub fn is_free_text(&self) -> bool {
        matches!(self, Source::Query | Source::Pasted | Source::Referrer)
    }

    pub fn is_company_source(&self) -> bool {
        matches!(
            self,
            Source::Path
                | Source::Query
                | Source::Pasted
                | Source::Header
                | Source::Cookie
                | Source::Environment
        )
    }

    pub fn is_experience_source(&self) -> bool {
        matches!(
            self,
            Source::Path
                | Source::Header
                | Source::Query
                | Source::Referrer
                | Source::Binding
                | Source::OwnerBinding
                | Source::Discovery
        )
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An identifier type the resolver can produce from raw text.
pub trait Identifier: Sized {
    /// Query/body parameter name; unrendered templates contain it literally.
    const PARAM: &'static str;

    fn pattern() -> &'static Regex;

    fn from_candidate(value: &str) -> Option<Self>;
}

impl Identifier for CompanyId {
    const PARAM: &'static str = "companyId";

    fn pattern() -> &'static Regex {
        &COMPANY_ID_PATTERN
    }

    fn from_candidate(value: &str) -> Option<Self> {
        CompanyId::parse(value)
    }
}

impl Identifier for ForumRef {
    const PARAM: &'static str = "experienceId";

    fn pattern() -> &'static Regex {
        &EXPERIENCE_ID_PATTERN
    }

    fn from_candidate(value: &str) -> Option<Self> {
        ForumRef::parse(value)
    }
}

/// Normalize one raw candidate.
///
/// Free text is narrowed to the first id-shaped match; placeholders left by
/// unrendered templates are rejected.
pub fn normalize(raw: &str, free_text: bool, pattern: &Regex, param: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let value = if free_text {
        pattern
            .find(trimmed)
            .map(|m| m.as_str())
            .unwrap_or(trimmed)
    } else {
        trimmed
    };

    if value.is_empty() {
        return Err("empty value".to_string());
    }
    if value == "undefined" {
        return Err("literal 'undefined'".to_string());
    }
    if value.starts_with('[') || value.contains(param) {
        return Err(format!("unrendered template '{}'", value));
    }
    Ok(value.to_string())
}

fn evaluate<T: Identifier>(source: Source, raw: &str) -> Result<T, String> {
    let value = normalize(raw, source.is_free_text(), T::pattern(), T::PARAM)?;
    T::from_candidate(&value).ok_or_else(|| format!("'{}' is not a valid {}", value, T::PARAM))
}

/// Pull a company id out of a pasted URL or raw id.
pub fn extract_company_id(input: &str) -> Option<CompanyId> {
    evaluate::<CompanyId>(Source::Pasted, input).ok()
}

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Resolution<T> {
    Resolved { value: T, source: Source },
    Unresolved,
}

impl<T> Resolution<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Resolution::Resolved { value, .. } => Some(value),
            Resolution::Unresolved => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Resolution::Resolved { value, .. } => Some(value),
            Resolution::Unresolved => None,
        }
    }

    pub fn source(&self) -> Option<Source> {
        match self {
            Resolution::Resolved { source, .. } => Some(*source),
            Resolution::Unresolved => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum AttemptOutcome {
    Absent,
    Rejected { reason: String },
    Failed { reason: String },
    Selected,
}

/// One step of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub source: Source,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// A resolution with the trace of how it was reached.
#[derive(Debug, Clone, Serialize)]
pub struct Traced<T> {
    #[serde(flatten)]
    pub resolution: Resolution<T>,
    pub attempts: Vec<Attempt>,
}

impl<T> Traced<T> {
    fn new() -> Self {
        Self {
            resolution: Resolution::Unresolved,
            attempts: Vec::new(),
        }
    }

    fn record(&mut self, source: Source, outcome: AttemptOutcome) {
        match &outcome {
            AttemptOutcome::Failed { reason } => {
                tracing::warn!("Resolution source {} failed: {}", source, reason)
            }
            AttemptOutcome::Rejected { reason } => {
                tracing::debug!("Resolution source {} rejected: {}", source, reason)
            }
            _ => {}
        }
        self.attempts.push(Attempt { source, outcome });
    }

    fn select(mut self, source: Source, value: T) -> Self {
        self.record(source, AttemptOutcome::Selected);
        self.resolution = Resolution::Resolved { value, source };
        self
    }

    pub fn value(&self) -> Option<&T> {
        self.resolution.value()
    }

    pub fn into_value(self) -> Option<T> {
        self.resolution.into_value()
    }
}

/// Return the first candidate that normalizes to a valid identifier.
pub fn resolve_first<T: Identifier>(candidates: &[(Source, Option<&str>)]) -> Traced<T> {
    let mut traced = Traced::new();
    for (source, raw) in candidates {
        let Some(raw) = raw else {
            traced.record(*source, AttemptOutcome::Absent);
            continue;
        };
        match evaluate::<T>(*source, raw) {
            Ok(value) => return traced.select(*source, value),
            Err(reason) => traced.record(*source, AttemptOutcome::Rejected { reason }),
        }
    }
    traced
}

/// Raw company candidates gathered from a request.
#[derive(Debug, Clone, Default)]
pub struct CompanyCandidates {
    pub path: Option<String>,
    pub query: Option<String>,
    pub pasted: Option<String>,
    pub header: Option<String>,
    pub cookie: Option<String>,
    pub environment: Option<String>,
}

impl CompanyCandidates {
    fn get(&self, source: Source) -> Option<&str> {
        match source {
            Source::Path => self.path.as_deref(),
            Source::Query => self.query.as_deref(),
            Source::Pasted => self.pasted.as_deref(),
            Source::Header => self.header.as_deref(),
            Source::Cookie => self.cookie.as_deref(),
            Source::Environment => self.environment.as_deref(),
            _ => None,
        }
    }
}

/// Resolve the company in the given order; non-company sources are ignored.
pub fn resolve_company(candidates: &CompanyCandidates, order: &[Source]) -> Traced<CompanyId> {
    let ordered: Vec<_> = order
        .iter()
        .filter(|s| s.is_company_source())
        .map(|s| (*s, candidates.get(*s)))
        .collect();
    resolve_first(&ordered)
}

/// Raw forum candidates gathered from a request.
#[derive(Debug, Clone, Default)]
pub struct ExperienceCandidates {
    pub path: Option<String>,
    pub header: Option<String>,
    pub query: Option<String>,
    pub referrer: Option<String>,
    /// The app experience the request is embedded in
    pub context_experience: Option<ExperienceId>,
}

impl ExperienceCandidates {
    fn get(&self, source: Source) -> Option<&str> {
        match source {
            Source::Path => self.path.as_deref(),
            Source::Header => self.header.as_deref(),
            Source::Query => self.query.as_deref(),
            Source::Referrer => self.referrer.as_deref(),
            _ => None,
        }
    }
}

/// A resolved forum and, when known, the company it was resolved for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumTarget {
    pub experience_id: ExperienceId,
    pub company_id: Option<CompanyId>,
}

/// Resolves the forum experience of a request.
///
/// Stored bindings and platform lookups are best effort: a failing step is
/// recorded and resolution moves on to the next source.
pub struct ForumResolver<'a> {
    repo: &'a Repository,
    platform: &'a dyn PlatformApi,
    order: &'a [Source],
}

impl<'a> ForumResolver<'a> {
    pub fn new(repo: &'a Repository, platform: &'a dyn PlatformApi, order: &'a [Source]) -> Self {
        Self {
            repo,
            platform,
            order,
        }
    }

    pub async fn resolve(
        &self,
        candidates: &ExperienceCandidates,
        company: Option<&CompanyId>,
    ) -> Traced<ForumTarget> {
        let mut traced = Traced::new();
        // Owner of the context experience, looked up at most once
        let mut owner_cache: Option<Result<Option<CompanyId>, String>> = None;

        for &source in self.order {
            let step = match source {
                Source::Path | Source::Header | Source::Query | Source::Referrer => {
                    match candidates.get(source) {
                        None => Ok(None),
                        Some(raw) => self.direct(source, raw, candidates, company).await,
                    }
                }
                Source::Binding => match company {
                    None => Ok(None),
                    Some(company) => self.bound_forum(company).await,
                },
                Source::OwnerBinding => match self.owner(candidates, &mut owner_cache).await {
                    Err(reason) => Err(Step::Failed(reason)),
                    Ok(None) => Ok(None),
                    Ok(Some(owner)) if Some(&owner) == company => Err(Step::Rejected(
                        "owner already tried as resolved company".to_string(),
                    )),
                    Ok(Some(owner)) => self.bound_forum(&owner).await,
                },
                Source::Discovery => {
                    let target = match company {
                        Some(company) => Ok(Some(company.clone())),
                        None => self.owner(candidates, &mut owner_cache).await,
                    };
                    match target {
                        Err(reason) => Err(Step::Failed(reason)),
                        Ok(None) => Ok(None),
                        Ok(Some(company)) => self.discover(&company).await,
                    }
                }
                _ => continue,
            };

            match step {
                Ok(Some(target)) => return traced.select(source, target),
                Ok(None) => traced.record(source, AttemptOutcome::Absent),
                Err(Step::Rejected(reason)) => {
                    traced.record(source, AttemptOutcome::Rejected { reason })
                }
                Err(Step::Failed(reason)) => traced.record(source, AttemptOutcome::Failed { reason }),
            }
        }
        traced
    }

    /// A forum named directly by the request. Slugs need a company to resolve against.
    ///
    /// The app experience a request is embedded in is never its own forum.
    async fn direct(
        &self,
        source: Source,
        raw: &str,
        candidates: &ExperienceCandidates,
        company: Option<&CompanyId>,
    ) -> Result<Option<ForumTarget>, Step> {
        match evaluate::<ForumRef>(source, raw).map_err(Step::Rejected)? {
            ForumRef::Experience(experience_id)
                if candidates.context_experience.as_ref() == Some(&experience_id) =>
            {
                Err(Step::Rejected(
                    "context experience is not a forum".to_string(),
                ))
            }
            ForumRef::Experience(experience_id) => Ok(Some(ForumTarget {
                experience_id,
                company_id: company.cloned(),
            })),
            ForumRef::Slug(slug) => {
                let company = company.ok_or_else(|| {
                    Step::Rejected(format!("slug '{}' needs a resolved company", slug))
                })?;
                self.canonical(company, &slug).await
            }
        }
    }

    async fn bound_forum(&self, company: &CompanyId) -> Result<Option<ForumTarget>, Step> {
        let binding = self
            .repo
            .find_active_binding(company)
            .await
            .map_err(|e| Step::Failed(e.to_string()))?;
        let Some(binding) = binding else {
            return Ok(None);
        };

        match ForumRef::parse(&binding.forum_id) {
            Some(ForumRef::Experience(experience_id)) => Ok(Some(ForumTarget {
                experience_id,
                company_id: Some(company.clone()),
            })),
            Some(ForumRef::Slug(slug)) => self.canonical(company, &slug).await,
            None => Err(Step::Rejected(format!(
                "stored forum id '{}' is malformed",
                binding.forum_id
            ))),
        }
    }

    async fn canonical(&self, company: &CompanyId, slug: &str) -> Result<Option<ForumTarget>, Step> {
        match resolve_forum_slug(self.platform, company, slug).await {
            Ok(Some(experience_id)) => Ok(Some(ForumTarget {
                experience_id,
                company_id: Some(company.clone()),
            })),
            Ok(None) => Err(Step::Rejected(format!(
                "slug '{}' matches no experience of {}",
                slug, company
            ))),
            Err(e) => Err(Step::Failed(e.to_string())),
        }
    }

    async fn discover(&self, company: &CompanyId) -> Result<Option<ForumTarget>, Step> {
        let experiences = self
            .platform
            .list_experiences(company)
            .await
            .map_err(|e| Step::Failed(e.to_string()))?;

        Ok(experiences
            .iter()
            .filter(|e| e.looks_like_forum())
            .find_map(|e| ExperienceId::parse(&e.id))
            .map(|experience_id| ForumTarget {
                experience_id,
                company_id: Some(company.clone()),
            }))
    }

    /// Company owning the context experience, if one was supplied.
    async fn owner(
        &self,
        candidates: &ExperienceCandidates,
        cache: &mut Option<Result<Option<CompanyId>, String>>,
    ) -> Result<Option<CompanyId>, String> {
        if let Some(owner) = cache {
            return owner.clone();
        }
        let Some(context) = candidates.context_experience.as_ref() else {
            return Ok(None);
        };

        let owner = self
            .platform
            .get_experience(context)
            .await
            .map(|experience| {
                experience
                    .as_ref()
                    .and_then(|e| e.owner())
                    .and_then(CompanyId::parse)
            })
            .map_err(|e| format!("owner of {}: {}", context, e));
        *cache = Some(owner.clone());
        owner
    }
}

enum Step {
    Rejected(String),
    Failed(String),
}
