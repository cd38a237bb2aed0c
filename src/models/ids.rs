//! Host platform identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const COMPANY_PREFIX: &str = "biz_";
pub const EXPERIENCE_PREFIX: &str = "exp_";
/// Legacy forum slug, resolvable to an `exp_` id for the owning company.
pub const FORUM_SLUG_PREFIX: &str = "forums-";

fn has_prefix(value: &str, prefix: &str) -> bool {
    value.len() > prefix.len() && value.starts_with(prefix)
}

/// A `biz_` company identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompanyId(String);

impl CompanyId {
    pub fn parse(value: &str) -> Option<Self> {
        has_prefix(value, COMPANY_PREFIX).then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CompanyId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if has_prefix(&value, COMPANY_PREFIX) {
            Ok(Self(value))
        } else {
            Err(format!("'{}' is not a {}... company id", value, COMPANY_PREFIX))
        }
    }
}

impl From<CompanyId> for String {
    fn from(id: CompanyId) -> Self {
        id.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A canonical `exp_` experience identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExperienceId(String);

impl ExperienceId {
    pub fn parse(value: &str) -> Option<Self> {
        has_prefix(value, EXPERIENCE_PREFIX).then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExperienceId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if has_prefix(&value, EXPERIENCE_PREFIX) {
            Ok(Self(value))
        } else {
            Err(format!(
                "'{}' is not a {}... experience id",
                value, EXPERIENCE_PREFIX
            ))
        }
    }
}

impl From<ExperienceId> for String {
    fn from(id: ExperienceId) -> Self {
        id.0
    }
}

impl fmt::Display for ExperienceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a forum: either its canonical experience id or a legacy slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForumRef {
    Experience(ExperienceId),
    Slug(String),
}

impl ForumRef {
    pub fn parse(value: &str) -> Option<Self> {
        if let Some(id) = ExperienceId::parse(value) {
            return Some(ForumRef::Experience(id));
        }
        has_prefix(value, FORUM_SLUG_PREFIX).then(|| ForumRef::Slug(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ForumRef::Experience(id) => id.as_str(),
            ForumRef::Slug(slug) => slug,
        }
    }
}

impl fmt::Display for ForumRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
