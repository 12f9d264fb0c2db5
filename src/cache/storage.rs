//! In-memory entry storage and per-entry state transitions.

use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use tokio::time::Instant;

use super::traits::{CacheEntry, CacheStatus, FetchOptions};
use crate::error::FetchError;

/// A request future shared by every caller of the same key.
pub type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, FetchError>>>;

/// The single outstanding request for an entry.
pub(super) struct InFlight<T> {
  /// Distinguishes this request from earlier ones for the same key
  pub id: u64,
  pub future: SharedFetch<T>,
}

/// A cache entry and its bookkeeping.
pub(super) struct Slot<T> {
  pub description: String,
  pub resource_kind: &'static str,
  pub value: Option<T>,
  pub error: Option<FetchError>,
  pub fetched_at: Option<Instant>,
  /// Set by `invalidate`; forces the next lookup to refetch
  pub invalidated: bool,
  pub in_flight: Option<InFlight<T>>,
  pub subscribers: usize,
  /// When the subscriber count last dropped to zero
  pub idle_since: Option<Instant>,
  /// Policy from the most recent lookup
  pub options: FetchOptions,
}

impl<T: Clone> Slot<T> {
  pub fn new(
    description: String,
    resource_kind: &'static str,
    options: FetchOptions,
    now: Instant,
  ) -> Self {
    Self {
      description,
      resource_kind,
      value: None,
      error: None,
      fetched_at: None,
      invalidated: false,
      in_flight: None,
      subscribers: 0,
      idle_since: Some(now),
      options,
    }
  }

  pub fn status(&self, now: Instant) -> CacheStatus {
    if self.error.is_some() {
      return CacheStatus::Error;
    }
    match self.fetched_at {
      Some(at) if self.invalidated || now.duration_since(at) > self.options.stale_time => {
        CacheStatus::Stale
      }
      Some(_) => CacheStatus::Fresh,
      None => CacheStatus::Pending,
    }
  }

  /// Whether a lookup at `now` must start a new request.
  ///
  /// Errors stick until the entry is invalidated; fresh data and outstanding
  /// requests never trigger another fetch.
  pub fn needs_fetch(&self, now: Instant) -> bool {
    if self.in_flight.is_some() {
      return false;
    }
    if self.invalidated {
      return true;
    }
    if self.error.is_some() {
      return false;
    }
    match self.fetched_at {
      Some(at) => now.duration_since(at) > self.options.stale_time,
      None => true,
    }
  }

  pub fn begin(&mut self, in_flight: InFlight<T>) {
    self.in_flight = Some(in_flight);
    self.invalidated = false;
    self.error = None;
  }

  /// Apply the outcome of request `id`. Outcomes of superseded requests are
  /// dropped. Returns whether the outcome was applied.
  pub fn settle(&mut self, id: u64, result: Result<T, FetchError>, now: Instant) -> bool {
    match &self.in_flight {
      Some(current) if current.id == id => {}
      _ => return false,
    }
    self.in_flight = None;
    match result {
      Ok(value) => {
        self.value = Some(value);
        self.fetched_at = Some(now);
        self.error = None;
      }
      Err(error) => self.error = Some(error),
    }
    if self.subscribers == 0 {
      self.idle_since = Some(now);
    }
    true
  }

  pub fn subscribe(&mut self) {
    self.subscribers += 1;
    self.idle_since = None;
  }

  pub fn unsubscribe(&mut self, now: Instant) {
    self.subscribers = self.subscribers.saturating_sub(1);
    if self.subscribers == 0 {
      self.idle_since = Some(now);
    }
  }

  /// Whether this entry may be purged at `now`.
  pub fn is_collectable(&self, now: Instant) -> bool {
    self.subscribers == 0
      && self.in_flight.is_none()
      && self
        .idle_since
        .map(|since| now.duration_since(since) > self.options.gc_time)
        .unwrap_or(false)
  }

  pub fn snapshot(&self, now: Instant) -> CacheEntry<T> {
    CacheEntry {
      key: self.description.clone(),
      status: self.status(now),
      value: self.value.clone(),
      error: self.error.clone(),
      fetched_at: self.fetched_at,
      subscriber_count: self.subscribers,
      is_fetching: self.in_flight.is_some(),
    }
  }
}

/// Map of entries keyed by their cache hash.
pub(super) struct EntryStore<T> {
  slots: HashMap<String, Slot<T>>,
}

impl<T: Clone> EntryStore<T> {
  pub fn new() -> Self {
    Self {
      slots: HashMap::new(),
    }
  }

  pub fn get(&self, hash: &str) -> Option<&Slot<T>> {
    self.slots.get(hash)
  }

  pub fn get_mut(&mut self, hash: &str) -> Option<&mut Slot<T>> {
    self.slots.get_mut(hash)
  }

  pub fn get_or_insert_with(&mut self, hash: &str, make: impl FnOnce() -> Slot<T>) -> &mut Slot<T> {
    self.slots.entry(hash.to_string()).or_insert_with(make)
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Slot<T>> {
    self.slots.values_mut()
  }

  /// Purge every collectable entry. Returns the descriptions removed.
  pub fn sweep(&mut self, now: Instant) -> Vec<String> {
    let mut removed = Vec::new();
    self.slots.retain(|_, slot| {
      if slot.is_collectable(now) {
        removed.push(slot.description.clone());
        false
      } else {
        true
      }
    });
    removed
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn clear(&mut self) {
    self.slots.clear();
  }
}
