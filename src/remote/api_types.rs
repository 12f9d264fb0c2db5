//! Serde-deserializable types matching the search service responses.
//!
//! These types are separate from domain types so that required fields are
//! enforced by deserialization and remaining checks happen in one place before
//! anything reaches the rest of the crate.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::FetchError;
use crate::remote::types::{RepoDetail, RepoId, RepoSummary};

// ============================================================================
// Search endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSearchItem {
  pub id: u64,
  pub full_name: String,
  pub owner_login: String,
  pub stars: u64,
  pub description: Option<String>,
  pub primary_language: Option<String>,
  pub topics: Option<Vec<String>>,
  pub github_url: Option<String>,
  pub owner_avatar_url: Option<String>,
  pub similarity: Option<f64>,
}

impl TryFrom<ApiSearchItem> for RepoSummary {
  type Error = FetchError;

  fn try_from(item: ApiSearchItem) -> Result<Self, Self::Error> {
    let full_name = require_name(item.id, item.full_name)?;

    Ok(RepoSummary {
      id: RepoId(item.id),
      full_name,
      owner_login: item.owner_login,
      stars: item.stars,
      description: non_empty(item.description),
      primary_language: non_empty(item.primary_language),
      topics: item.topics.unwrap_or_default(),
      github_url: non_empty(item.github_url),
      owner_avatar_url: non_empty(item.owner_avatar_url),
      similarity: item.similarity,
    })
  }
}

// ============================================================================
// Project detail endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiProjectDetail {
  pub id: u64,
  pub full_name: String,
  pub owner_login: String,
  pub stars: u64,
  #[serde(default)]
  pub forks: u64,
  #[serde(default)]
  pub watchers: u64,
  #[serde(default)]
  pub open_issues: u64,
  pub description: Option<String>,
  pub primary_language: Option<String>,
  pub topics: Option<Vec<String>>,
  pub github_url: Option<String>,
  pub owner_url: Option<String>,
  pub owner_avatar_url: Option<String>,
  pub languages_breakdown: Option<BTreeMap<String, u64>>,
  pub pushed_at_github: Option<DateTime<Utc>>,
}

impl TryFrom<ApiProjectDetail> for RepoDetail {
  type Error = FetchError;

  fn try_from(detail: ApiProjectDetail) -> Result<Self, Self::Error> {
    let full_name = require_name(detail.id, detail.full_name)?;

    Ok(RepoDetail {
      id: RepoId(detail.id),
      full_name,
      owner_login: detail.owner_login,
      stars: detail.stars,
      forks: detail.forks,
      watchers: detail.watchers,
      open_issues: detail.open_issues,
      description: non_empty(detail.description),
      primary_language: non_empty(detail.primary_language),
      topics: detail.topics.unwrap_or_default(),
      github_url: non_empty(detail.github_url),
      owner_url: non_empty(detail.owner_url),
      owner_avatar_url: non_empty(detail.owner_avatar_url),
      languages_breakdown: detail.languages_breakdown.unwrap_or_default(),
      pushed_at_github: detail.pushed_at_github,
    })
  }
}

// ============================================================================
// Error body
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub detail: Option<serde_json::Value>,
}

impl ApiErrorBody {
  /// Message carried by an error response, if it has a usable one.
  pub fn message(body: &str) -> Option<String> {
    let parsed: ApiErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail? {
      serde_json::Value::String(s) => Some(s).filter(|s| !s.trim().is_empty()),
      // Validation errors come back as structured values
      other => Some(other.to_string()),
    }
  }
}

// ============================================================================
// Parsing entry points
// ============================================================================

pub fn parse_search_results(body: &str) -> Result<Vec<RepoSummary>, FetchError> {
  let items: Vec<ApiSearchItem> = serde_json::from_str(body)
    .map_err(|e| FetchError::parse(format!("Failed to parse search results: {}", e)))?;
  items.into_iter().map(RepoSummary::try_from).collect()
}

pub fn parse_project_detail(body: &str) -> Result<RepoDetail, FetchError> {
  let detail: ApiProjectDetail = serde_json::from_str(body)
    .map_err(|e| FetchError::parse(format!("Failed to parse project details: {}", e)))?;
  RepoDetail::try_from(detail)
}

fn require_name(id: u64, name: String) -> Result<String, FetchError> {
  let trimmed = name.trim();
  if trimmed.is_empty() {
    return Err(FetchError::parse(format!(
      "repository {} has an empty full_name",
      id
    )));
  }
  Ok(trimmed.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.filter(|s| !s.trim().is_empty())
}
