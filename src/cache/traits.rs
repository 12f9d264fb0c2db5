//! Core traits and types for the caching system.

use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::FetchError;

/// Trait for request signatures that identify a cache entry.
///
/// An entry is uniquely identified by its resource kind plus its resolved
/// parameters; two keys that resolve to the same pair share one entry.
pub trait QueryKey: Clone + PartialEq + Send + Sync + 'static {
  /// Resource kind (e.g., "search", "detail")
  fn resource_kind(&self) -> &'static str;

  /// Canonical string form of the request parameters.
  fn resolved_params(&self) -> String;

  /// Human readable description for logs.
  fn description(&self) -> String;

  /// Stable, fixed-length hash of `(resource_kind, resolved_params)`.
  fn cache_hash(&self) -> String {
    let input = format!("{}:{}", self.resource_kind(), self.resolved_params());
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Per-request cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
  /// How long fetched data is considered fresh
  pub stale_time: Duration,
  /// How long an unobserved entry is kept before it is purged
  pub gc_time: Duration,
  /// Extra attempts after a retryable failure
  pub retry_count: u32,
}

impl Default for FetchOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(120 * 60),
      gc_time: Duration::from_secs(120 * 60),
      retry_count: 1,
    }
  }
}

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
  /// First fetch issued, nothing settled yet
  Pending,
  /// Data is within its stale time
  Fresh,
  /// Data is older than its stale time or was invalidated
  Stale,
  /// Last fetch failed after exhausting retries
  Error,
}

/// Point-in-time view of a cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
  /// Description of the key this entry belongs to
  pub key: String,
  pub status: CacheStatus,
  /// Last successfully fetched value, kept across later failures
  pub value: Option<T>,
  pub error: Option<FetchError>,
  /// When `value` was fetched
  pub fetched_at: Option<Instant>,
  pub subscriber_count: usize,
  /// Whether a request for this key is currently outstanding
  pub is_fetching: bool,
}

impl<T> CacheEntry<T> {
  pub fn is_fresh(&self) -> bool {
    self.status == CacheStatus::Fresh
  }

  pub fn is_stale(&self) -> bool {
    self.status == CacheStatus::Stale
  }

  pub fn is_error(&self) -> bool {
    self.status == CacheStatus::Error
  }
}
