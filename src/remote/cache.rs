//! Cache keys for search service requests.

use crate::cache::QueryKey;

use super::types::{RepoId, SearchParams};

/// One page of search results
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchKey(pub SearchParams);

/// Repository details
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetailKey(pub RepoId);

/// Repository README
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadmeKey(pub RepoId);

impl QueryKey for SearchKey {
  fn resource_kind(&self) -> &'static str {
    "search"
  }

  fn resolved_params(&self) -> String {
    let p = &self.0;
    // JSON array keeps fields unambiguous whatever the text contains
    serde_json::json!([p.query, p.language, p.min_stars, p.topics, p.page, p.page_size])
      .to_string()
  }

  fn description(&self) -> String {
    let p = &self.0;
    let mut desc = format!("search '{}' page {} ({} per page)", p.query, p.page, p.page_size);
    if !p.language.is_empty() {
      desc.push_str(&format!(" language={}", p.language));
    }
    if let Some(min_stars) = p.min_stars {
      desc.push_str(&format!(" min_stars={}", min_stars));
    }
    if !p.topics.is_empty() {
      desc.push_str(&format!(" topics={}", p.topics));
    }
    desc
  }
}

impl QueryKey for DetailKey {
  fn resource_kind(&self) -> &'static str {
    "detail"
  }

  fn resolved_params(&self) -> String {
    self.0.to_string()
  }

  fn description(&self) -> String {
    format!("detail {}", self.0)
  }
}

impl QueryKey for ReadmeKey {
  fn resource_kind(&self) -> &'static str {
    "readme"
  }

  fn resolved_params(&self) -> String {
    self.0.to_string()
  }

  fn description(&self) -> String {
    format!("readme {}", self.0)
  }
}

/// Normalize a comma-separated topic list for consistent keys and requests.
/// Trims each topic and drops empty ones.
pub fn normalize_topics(topics: &str) -> String {
  topics
    .split(',')
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .collect::<Vec<_>>()
    .join(",")
}
