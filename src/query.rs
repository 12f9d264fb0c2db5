//! Reactive query bindings between derived keys and the fetch cache.
//!
//! Inspired by TanStack Query, a [`QueryBinding`] tracks one derived cache key,
//! drives [`FetchCache`] lookups for it and exposes loading/success/error
//! states to consumers.
//!
//! # Example
//!
//! ```ignore
//! let mut search = QueryBinding::new("search", cache, options, move |key: &SearchKey| {
//!     let source = source.clone();
//!     let key = key.clone();
//!     async move { source.search_repositories(&key.0).await }
//! });
//!
//! // After every state change
//! search.set_key(search_key(&store.snapshot()));
//!
//! // In event loop tick
//! if search.poll() {
//!     // State changed, re-render
//! }
//!
//! // In render
//! match search.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(data),
//!     QueryState::Error(e) => render_error(e),
//!     QueryState::Idle => {}
//! }
//! ```
//!
//! Results are applied only while they belong to the binding's current key.
//! A request started for a key the binding has since moved away from keeps
//! running and still fills the cache, but its result is discarded on arrival.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::{FetchCache, FetchOptions, Lookup, QueryKey};
use crate::error::FetchError;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// No valid key
  Idle,
  /// Request issued for the current key, nothing resolved yet
  Loading,
  /// Data for the current key
  Success(T),
  /// The current key's request failed
  Error(FetchError),
}

impl<T> QueryState<T> {
  pub fn is_idle(&self) -> bool {
    matches!(self, QueryState::Idle)
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&FetchError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// What a consumer renders from: `{data, isLoading, isError}`.
#[derive(Debug)]
pub struct QueryView<'a, T> {
  pub data: Option<&'a T>,
  pub is_loading: bool,
  pub is_error: bool,
  pub error: Option<&'a FetchError>,
  /// A request is outstanding while `data` is shown (revalidation)
  pub is_fetching: bool,
}

/// Factory producing the request future for a key
type FetcherFn<K, T> =
  Arc<dyn Fn(&K) -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync>;

/// A settled outcome tagged with the key it was requested for
type Outcome<K, T> = (K, Result<T, FetchError>);

/// Binding of one derived key to the fetch cache.
pub struct QueryBinding<K, T>
where
  K: QueryKey,
  T: Clone + Send + Sync + 'static,
{
  name: &'static str,
  cache: FetchCache<T>,
  options: FetchOptions,
  fetcher: FetcherFn<K, T>,
  key: Option<K>,
  state: QueryState<T>,
  is_fetching: bool,
  tx: mpsc::UnboundedSender<Outcome<K, T>>,
  rx: mpsc::UnboundedReceiver<Outcome<K, T>>,
}

impl<K, T> QueryBinding<K, T>
where
  K: QueryKey,
  T: Clone + Send + Sync + 'static,
{
  /// Create an idle binding. `fetcher` builds the request for a key each
  /// time the cache decides a fetch is needed.
  pub fn new<F, Fut>(
    name: &'static str,
    cache: FetchCache<T>,
    options: FetchOptions,
    fetcher: F,
  ) -> Self
  where
    F: Fn(&K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      name,
      cache,
      options,
      fetcher: Arc::new(move |key: &K| fetcher(key).boxed()),
      key: None,
      state: QueryState::Idle,
      is_fetching: false,
      tx,
      rx,
    }
  }

  /// Point the binding at a newly derived key.
  ///
  /// `None` returns the binding to `Idle`. A different key immediately
  /// replaces the visible state with the new key's cached state, so nothing
  /// belonging to the previous key is shown from here on. A key whose entry
  /// failed without ever holding data is fetched again on rebinding. Returns
  /// whether the key changed.
  pub fn set_key(&mut self, key: Option<K>) -> bool {
    if key == self.key {
      return false;
    }

    if let Some(old) = self.key.take() {
      self.cache.unsubscribe(&old);
    }
    self.is_fetching = false;

    match key {
      Some(key) => {
        debug!(binding = self.name, key = %key.description(), "key changed");
        self.cache.subscribe(&key);
        let failed_empty = self
          .cache
          .peek(&key)
          .is_some_and(|entry| entry.is_error() && entry.value.is_none());
        if failed_empty {
          self.cache.invalidate(&key);
        }
        self.key = Some(key);
        self.issue();
      }
      None => {
        debug!(binding = self.name, "no key, idle");
        self.state = QueryState::Idle;
      }
    }
    true
  }

  /// Revalidate the current key: refetches only when its entry is stale.
  pub fn refresh(&mut self) {
    if self.key.is_some() {
      self.issue();
    }
  }

  /// Refetch the current key regardless of its entry's state, clearing a
  /// sticky error.
  pub fn retry(&mut self) {
    if let Some(key) = &self.key {
      self.cache.invalidate(key);
    }
    self.issue();
  }

  /// Apply outcomes that have arrived since the last poll.
  ///
  /// Returns `true` if the visible state changed. Call this in your event
  /// loop tick handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(outcome) = self.rx.try_recv() {
      changed |= self.apply(outcome);
    }
    changed
  }

  /// Wait until the current key's outstanding request (if any) has settled.
  pub async fn settle(&mut self) -> &QueryState<T> {
    self.poll();
    while self.is_fetching {
      match self.rx.recv().await {
        Some(outcome) => {
          self.apply(outcome);
        }
        // Unreachable while `self.tx` is alive
        None => break,
      }
    }
    &self.state
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn key(&self) -> Option<&K> {
    self.key.as_ref()
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.state.error()
  }

  /// Whether a request for the current key is outstanding.
  pub fn is_fetching(&self) -> bool {
    self.is_fetching
  }

  pub fn view(&self) -> QueryView<'_, T> {
    QueryView {
      data: self.state.data(),
      is_loading: self.state.is_loading(),
      is_error: self.state.is_error(),
      error: self.state.error(),
      is_fetching: self.is_fetching,
    }
  }

  /// Look up the current key and mirror its entry; forward the outstanding
  /// request's outcome to this binding when there is one.
  fn issue(&mut self) {
    let Some(key) = self.key.clone() else {
      return;
    };

    let fetcher = Arc::clone(&self.fetcher);
    let request_key = key.clone();
    let Lookup { entry, in_flight } = self
      .cache
      .get(&key, move || fetcher(&request_key), self.options);

    self.state = match (entry.error, entry.value) {
      (Some(error), _) => QueryState::Error(error),
      (None, Some(value)) => QueryState::Success(value),
      (None, None) => QueryState::Loading,
    };
    self.is_fetching = in_flight.is_some();

    if let Some(future) = in_flight {
      let tx = self.tx.clone();
      tokio::spawn(async move {
        let result = future.await;
        // Receiver may have been dropped along with the binding
        let _ = tx.send((key, result));
      });
    }
  }

  /// Apply one outcome if it belongs to the current key.
  fn apply(&mut self, (key, result): Outcome<K, T>) -> bool {
    if self.key.as_ref() != Some(&key) {
      debug!(
        binding = self.name,
        key = %key.description(),
        "discarding result for superseded key"
      );
      return false;
    }
    self.is_fetching = false;
    self.state = match result {
      Ok(data) => QueryState::Success(data),
      Err(error) => QueryState::Error(error),
    };
    true
  }
}

impl<K, T> Drop for QueryBinding<K, T>
where
  K: QueryKey,
  T: Clone + Send + Sync + 'static,
{
  fn drop(&mut self) {
    if let Some(key) = self.key.take() {
      self.cache.unsubscribe(&key);
    }
  }
}

impl<K, T> std::fmt::Debug for QueryBinding<K, T>
where
  K: QueryKey,
  T: Clone + Send + Sync + std::fmt::Debug + 'static,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryBinding")
      .field("name", &self.name)
      .field("key", &self.key.as_ref().map(|k| k.description()))
      .field("state", &self.state)
      .field("is_fetching", &self.is_fetching)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  /// Key whose fetch takes `delay_ms` and returns `value`
  #[derive(Clone, Debug, PartialEq)]
  struct TestKey {
    name: &'static str,
    delay_ms: u64,
    value: u32,
  }

  impl QueryKey for TestKey {
    fn resource_kind(&self) -> &'static str {
      "test"
    }

    fn resolved_params(&self) -> String {
      self.name.to_string()
    }

    fn description(&self) -> String {
      self.name.to_string()
    }
  }

  fn key(name: &'static str, delay_ms: u64, value: u32) -> TestKey {
    TestKey {
      name,
      delay_ms,
      value,
    }
  }

  fn options() -> FetchOptions {
    FetchOptions {
      stale_time: Duration::from_secs(60),
      gc_time: Duration::from_secs(300),
      retry_count: 0,
    }
  }

  fn binding(cache: &FetchCache<u32>) -> QueryBinding<TestKey, u32> {
    QueryBinding::new("test", cache.clone(), options(), |key: &TestKey| {
      let key = key.clone();
      async move {
        tokio::time::sleep(Duration::from_millis(key.delay_ms)).await;
        Ok(key.value)
      }
    })
  }

  #[tokio::test(start_paused = true)]
  async fn test_idle_without_key() {
    let cache = FetchCache::new("test");
    let mut query = binding(&cache);

    assert!(query.state().is_idle());
    assert!(!query.set_key(None));
    assert!(query.view().data.is_none());
    assert!(cache.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_loading_then_success() {
    let cache = FetchCache::new("test");
    let mut query = binding(&cache);

    assert!(query.set_key(Some(key("a", 10, 1))));
    assert!(query.is_loading());
    assert!(query.is_fetching());

    // Wait for the result
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(query.poll());
    let view = query.view();
    assert_eq!(view.data, Some(&1));
    assert!(!view.is_loading);
    assert!(!view.is_error);
  }

  #[tokio::test(start_paused = true)]
  async fn test_error_state() {
    let cache: FetchCache<u32> = FetchCache::new("test");
    let mut query = QueryBinding::new("test", cache, options(), |_: &TestKey| async {
      Err::<u32, _>(FetchError::parse("Something went wrong"))
    });

    query.set_key(Some(key("a", 0, 0)));
    assert!(query.settle().await.is_error());
    assert_eq!(query.error().unwrap().message, "Something went wrong");
    assert!(query.view().is_error);
  }

  #[tokio::test(start_paused = true)]
  async fn test_result_for_superseded_key_is_discarded() {
    let cache = FetchCache::new("test");
    let mut query = binding(&cache);

    query.set_key(Some(key("slow", 100, 1)));
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.set_key(Some(key("fast", 20, 2)));
    assert!(query.is_loading());

    // Both requests finish; the slow one lands last
    tokio::time::sleep(Duration::from_millis(200)).await;
    query.poll();

    assert_eq!(query.data(), Some(&2));
    assert_eq!(query.key().unwrap().name, "fast");
    // The superseded request still populated the cache
    assert_eq!(cache.peek(&key("slow", 100, 1)).unwrap().value, Some(1));
  }

  #[tokio::test(start_paused = true)]
  async fn test_late_result_never_overwrites_newer_key() {
    let cache = FetchCache::new("test");
    let mut query = binding(&cache);

    query.set_key(Some(key("first", 100, 1)));
    query.set_key(Some(key("second", 10, 2)));
    assert_eq!(query.settle().await.data(), Some(&2));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!query.poll());
    assert_eq!(query.data(), Some(&2));
  }

  #[tokio::test(start_paused = true)]
  async fn test_cached_key_resolves_immediately() {
    let cache = FetchCache::new("test");
    let mut query = binding(&cache);

    query.set_key(Some(key("a", 10, 1)));
    query.settle().await;
    query.set_key(Some(key("b", 10, 2)));
    query.settle().await;

    query.set_key(Some(key("a", 10, 1)));
    assert_eq!(query.data(), Some(&1));
    assert!(!query.is_fetching());
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_data_shown_while_revalidating() {
    let cache = FetchCache::new("test");
    let counter = Arc::new(AtomicU32::new(0));
    let calls = Arc::clone(&counter);
    let mut query = QueryBinding::new("test", cache, options(), move |_: &TestKey| {
      let calls = Arc::clone(&calls);
      async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
      }
    });

    query.set_key(Some(key("a", 0, 0)));
    assert_eq!(query.settle().await.data(), Some(&1));

    tokio::time::advance(Duration::from_secs(61)).await;
    query.refresh();
    assert_eq!(query.data(), Some(&1));
    assert!(query.is_fetching());
    assert!(!query.is_loading());

    assert_eq!(query.settle().await.data(), Some(&2));
  }

  #[tokio::test(start_paused = true)]
  async fn test_refresh_within_stale_time_does_not_refetch() {
    let cache = FetchCache::new("test");
    let counter = Arc::new(AtomicU32::new(0));
    let calls = Arc::clone(&counter);
    let mut query = QueryBinding::new("test", cache, options(), move |_: &TestKey| {
      let calls = Arc::clone(&calls);
      async move { Ok::<_, FetchError>(calls.fetch_add(1, Ordering::SeqCst)) }
    });

    query.set_key(Some(key("a", 0, 0)));
    query.settle().await;
    query.refresh();
    query.refresh();
    assert!(!query.is_fetching());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_retry_recovers_from_error() {
    let cache = FetchCache::new("test");
    let counter = Arc::new(AtomicU32::new(0));
    let calls = Arc::clone(&counter);
    let mut query = QueryBinding::new("test", cache, options(), move |_: &TestKey| {
      let attempt = calls.fetch_add(1, Ordering::SeqCst);
      async move {
        if attempt == 0 {
          Err(FetchError::network("connection reset"))
        } else {
          Ok(7u32)
        }
      }
    });

    query.set_key(Some(key("a", 0, 0)));
    assert!(query.settle().await.is_error());

    // Errors stick across plain revalidation
    query.refresh();
    assert!(query.is_error());
    assert!(!query.is_fetching());

    query.retry();
    assert_eq!(query.settle().await.data(), Some(&7));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_key_refetched_when_bound_again() {
    let cache: FetchCache<u32> = FetchCache::new("test");
    let counter = Arc::new(AtomicU32::new(0));
    let calls = Arc::clone(&counter);
    let mut query = QueryBinding::new("test", cache, options(), move |key: &TestKey| {
      let attempt = calls.fetch_add(1, Ordering::SeqCst);
      let value = key.value;
      async move {
        if attempt == 0 {
          Err(FetchError::network("connection reset"))
        } else {
          Ok(value)
        }
      }
    });

    query.set_key(Some(key("a", 0, 1)));
    assert!(query.settle().await.is_error());

    query.set_key(Some(key("b", 0, 2)));
    assert_eq!(query.settle().await.data(), Some(&2));

    query.set_key(Some(key("a", 0, 1)));
    assert!(query.is_loading());
    assert_eq!(query.settle().await.data(), Some(&1));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_subscription_follows_key() {
    let cache = FetchCache::new("test");
    let mut query = binding(&cache);
    let a = key("a", 0, 1);
    let b = key("b", 0, 2);

    query.set_key(Some(a.clone()));
    query.settle().await;
    assert_eq!(cache.peek(&a).unwrap().subscriber_count, 1);

    query.set_key(Some(b.clone()));
    assert_eq!(cache.peek(&a).unwrap().subscriber_count, 0);
    assert_eq!(cache.peek(&b).unwrap().subscriber_count, 1);

    drop(query);
    assert_eq!(cache.peek(&b).unwrap().subscriber_count, 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_clearing_key_goes_idle() {
    let cache = FetchCache::new("test");
    let mut query = binding(&cache);

    query.set_key(Some(key("a", 50, 1)));
    assert!(query.set_key(None));
    assert!(query.state().is_idle());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!query.poll());
    assert!(query.state().is_idle());
  }
}
