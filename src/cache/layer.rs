//! Fetch cache that orchestrates staleness, coalescing and GC around fetchers.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::storage::{EntryStore, InFlight, SharedFetch, Slot};
use super::traits::{CacheEntry, FetchOptions, QueryKey};
use crate::error::FetchError;

/// Result of a cache lookup: the entry as it stands plus a handle on the
/// outstanding request, if there is one.
pub struct Lookup<T> {
  pub entry: CacheEntry<T>,
  pub in_flight: Option<SharedFetch<T>>,
}

impl<T: Clone> Lookup<T> {
  /// Wait for the entry to settle and return its outcome.
  ///
  /// Settled entries resolve immediately; a stale entry being revalidated
  /// resolves with the revalidated data.
  pub async fn settled(self) -> Result<T, FetchError> {
    if let Some(future) = self.in_flight {
      return future.await;
    }
    if let Some(error) = self.entry.error {
      return Err(error);
    }
    self
      .entry
      .value
      .ok_or_else(|| FetchError::interrupted(format!("{} has no data", self.entry.key)))
  }
}

/// Async-result cache keyed by request signature.
///
/// All entry transitions happen behind one mutex which is never held across an
/// await; requests run on spawned tasks so they complete and populate the
/// cache even when every caller has stopped listening.
pub struct FetchCache<T> {
  entries: Arc<Mutex<EntryStore<T>>>,
  next_id: Arc<AtomicU64>,
  /// Label used in logs (e.g., "search")
  name: &'static str,
}

impl<T> FetchCache<T>
where
  T: Clone + Send + Sync + 'static,
{
  pub fn new(name: &'static str) -> Self {
    Self {
      entries: Arc::new(Mutex::new(EntryStore::new())),
      next_id: Arc::new(AtomicU64::new(1)),
      name,
    }
  }

  /// Look up `key`, starting a request when the entry is absent, stale or
  /// invalidated and no request for it is outstanding.
  ///
  /// The request is recorded against the key before this returns, so any
  /// lookup made while it runs joins it instead of starting another one.
  /// Must be called from within a tokio runtime.
  pub fn get<K, F, Fut>(&self, key: &K, fetcher: F, options: FetchOptions) -> Lookup<T>
  where
    K: QueryKey,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let hash = key.cache_hash();
    let now = Instant::now();
    let mut entries = lock(&self.entries);
    self.sweep(&mut entries, now);

    let slot = entries.get_or_insert_with(&hash, || {
      Slot::new(key.description(), key.resource_kind(), options, now)
    });
    slot.options = options;

    if slot.needs_fetch(now) {
      let id = self.next_id.fetch_add(1, Ordering::Relaxed);
      info!(cache = self.name, key = %slot.description, id, "fetching");
      let description = slot.description.clone();
      let future = self.spawn_fetch(hash, id, description, fetcher, options.retry_count);
      slot.begin(InFlight { id, future });
    } else if slot.in_flight.is_some() {
      debug!(cache = self.name, key = %slot.description, "joining in-flight request");
    } else {
      debug!(cache = self.name, key = %slot.description, status = ?slot.status(now), "cache hit");
    }

    Lookup {
      entry: slot.snapshot(now),
      in_flight: slot.in_flight.as_ref().map(|f| f.future.clone()),
    }
  }

  /// Look up `key` and wait for its outcome.
  pub async fn fetch<K, F, Fut>(
    &self,
    key: &K,
    fetcher: F,
    options: FetchOptions,
  ) -> Result<T, FetchError>
  where
    K: QueryKey,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    self.get(key, fetcher, options).settled().await
  }

  /// Current entry for `key` without starting a request.
  pub fn peek<K: QueryKey>(&self, key: &K) -> Option<CacheEntry<T>> {
    let entries = lock(&self.entries);
    entries
      .get(&key.cache_hash())
      .map(|slot| slot.snapshot(Instant::now()))
  }

  /// Register a consumer of `key`. Observed entries are never collected.
  pub fn subscribe<K: QueryKey>(&self, key: &K) {
    let mut entries = lock(&self.entries);
    let now = Instant::now();
    entries
      .get_or_insert_with(&key.cache_hash(), || {
        Slot::new(key.description(), key.resource_kind(), FetchOptions::default(), now)
      })
      .subscribe();
  }

  /// Drop a consumer of `key`; the GC window starts when the last one leaves.
  pub fn unsubscribe<K: QueryKey>(&self, key: &K) {
    let mut entries = lock(&self.entries);
    if let Some(slot) = entries.get_mut(&key.cache_hash()) {
      slot.unsubscribe(Instant::now());
    }
  }

  /// Mark `key` stale regardless of its stale time. Returns false when the
  /// key has no entry.
  ///
  /// An entry invalidated while its request is outstanding is stale as soon
  /// as that request settles.
  pub fn invalidate<K: QueryKey>(&self, key: &K) -> bool {
    let mut entries = lock(&self.entries);
    match entries.get_mut(&key.cache_hash()) {
      Some(slot) => {
        debug!(cache = self.name, key = %slot.description, "invalidated");
        slot.invalidated = true;
        true
      }
      None => false,
    }
  }

  /// Invalidate every entry of one resource kind. Returns how many were hit.
  pub fn invalidate_kind(&self, resource_kind: &str) -> usize {
    let mut entries = lock(&self.entries);
    let mut count = 0;
    for slot in entries.iter_mut() {
      if slot.resource_kind == resource_kind {
        slot.invalidated = true;
        count += 1;
      }
    }
    debug!(cache = self.name, resource_kind, count, "invalidated kind");
    count
  }

  /// Purge entries nobody has observed for longer than their GC time.
  pub fn collect_garbage(&self) -> usize {
    let mut entries = lock(&self.entries);
    self.sweep(&mut entries, Instant::now())
  }

  pub fn len(&self) -> usize {
    lock(&self.entries).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drop every entry. Outstanding requests still finish but their outcomes
  /// are discarded.
  pub fn clear(&self) {
    lock(&self.entries).clear();
  }

  fn sweep(&self, entries: &mut EntryStore<T>, now: Instant) -> usize {
    let removed = entries.sweep(now);
    for key in &removed {
      debug!(cache = self.name, key = %key, "collected");
    }
    removed.len()
  }

  fn spawn_fetch<F, Fut>(
    &self,
    hash: String,
    id: u64,
    description: String,
    fetcher: F,
    retry_count: u32,
  ) -> SharedFetch<T>
  where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let entries = Arc::clone(&self.entries);
    let name = self.name;

    let handle = tokio::spawn(async move {
      let result = AssertUnwindSafe(run_with_retries(name, &description, fetcher, retry_count))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(FetchError::interrupted("fetcher panicked")));

      let mut entries = lock(&entries);
      let applied = entries
        .get_mut(&hash)
        .map(|slot| slot.settle(id, result.clone(), Instant::now()))
        .unwrap_or(false);
      if !applied {
        debug!(cache = name, key = %description, id, "dropping outcome of superseded request");
      }
      result
    });

    async move {
      handle
        .await
        .unwrap_or_else(|e| Err(FetchError::interrupted(format!("fetch task failed: {}", e))))
    }
    .boxed()
    .shared()
  }
}

impl<T> Clone for FetchCache<T> {
  fn clone(&self) -> Self {
    Self {
      entries: Arc::clone(&self.entries),
      next_id: Arc::clone(&self.next_id),
      name: self.name,
    }
  }
}

/// Run `fetcher`, retrying retryable failures up to `retry_count` times with
/// no delay in between.
async fn run_with_retries<T, F, Fut>(
  name: &'static str,
  description: &str,
  fetcher: F,
  retry_count: u32,
) -> Result<T, FetchError>
where
  F: Fn() -> Fut,
  Fut: Future<Output = Result<T, FetchError>>,
{
  let mut attempt = 0;
  loop {
    match fetcher().await {
      Ok(value) => return Ok(value),
      Err(error) if error.is_retryable() && attempt < retry_count => {
        attempt += 1;
        warn!(cache = name, key = %description, attempt, %error, "fetch failed, retrying");
      }
      Err(error) => {
        warn!(cache = name, key = %description, %error, "fetch failed");
        return Err(error);
      }
    }
  }
}

fn lock<T>(entries: &Mutex<EntryStore<T>>) -> MutexGuard<'_, EntryStore<T>> {
  entries.lock().unwrap_or_else(PoisonError::into_inner)
}
