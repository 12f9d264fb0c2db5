use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a repository in the remote index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId(pub u64);

impl fmt::Display for RepoId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl std::str::FromStr for RepoId {
  type Err = std::num::ParseIntError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.trim().parse().map(RepoId)
  }
}

/// Parameters of one search request, fully resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
  pub query: String,
  pub language: String,
  pub min_stars: Option<u32>,
  pub topics: String,
  pub page: u32,
  pub page_size: u32,
}

/// Search result item for list views
#[derive(Debug, Clone, PartialEq)]
pub struct RepoSummary {
  pub id: RepoId,
  pub full_name: String,
  pub owner_login: String,
  pub stars: u64,
  pub description: Option<String>,
  pub primary_language: Option<String>,
  pub topics: Vec<String>,
  pub github_url: Option<String>,
  pub owner_avatar_url: Option<String>,
  /// Relevance score reported by the ranking service
  pub similarity: Option<f64>,
}

/// Full repository details
#[derive(Debug, Clone, PartialEq)]
pub struct RepoDetail {
  pub id: RepoId,
  pub full_name: String,
  pub owner_login: String,
  pub stars: u64,
  pub forks: u64,
  pub watchers: u64,
  pub open_issues: u64,
  pub description: Option<String>,
  pub primary_language: Option<String>,
  pub topics: Vec<String>,
  pub github_url: Option<String>,
  pub owner_url: Option<String>,
  pub owner_avatar_url: Option<String>,
  /// Bytes of code per language
  pub languages_breakdown: BTreeMap<String, u64>,
  pub pushed_at_github: Option<DateTime<Utc>>,
}

/// One language's share of a repository's code
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageShare {
  pub language: String,
  pub bytes: u64,
  pub percent: f64,
}

impl RepoDetail {
  /// The `limit` largest languages by byte count, with their share of the total.
  pub fn language_shares(&self, limit: usize) -> Vec<LanguageShare> {
    let total = self
      .languages_breakdown
      .values()
      .fold(0u64, |acc, &bytes| acc.saturating_add(bytes));
    if total == 0 {
      return Vec::new();
    }

    let mut shares: Vec<LanguageShare> = self
      .languages_breakdown
      .iter()
      .map(|(language, &bytes)| LanguageShare {
        language: language.clone(),
        bytes,
        percent: bytes as f64 * 100.0 / total as f64,
      })
      .collect();
    // Stable sort keeps alphabetical order among equal sizes
    shares.sort_by(|a, b| b.bytes.cmp(&a.bytes));
    shares.truncate(limit);
    shares
  }
}
