//! End-to-end behavior of a session against an in-memory search service.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use repolens::cache::{CacheStatus, FetchOptions};
use repolens::error::{ErrorKind, FetchError};
use repolens::remote::{RepoDetail, RepoId, RepoSource, RepoSummary, SearchKey, SearchParams};
use repolens::session::{Caches, Session};
use repolens::store::{Action, AppState, FilterUpdate, StorePolicy};

#[derive(Default)]
struct Inner {
  search_calls: AtomicUsize,
  detail_calls: AtomicUsize,
  readme_calls: AtomicUsize,
  /// Total results per query; 30 when absent
  totals: Mutex<HashMap<String, u32>>,
  /// Response delay per query or id; 10ms when absent
  delays: Mutex<HashMap<String, Duration>>,
  search_failures: Mutex<VecDeque<FetchError>>,
}

#[derive(Clone, Default)]
struct MemorySource {
  inner: Arc<Inner>,
}

impl MemorySource {
  fn with_total(self, query: &str, total: u32) -> Self {
    self.inner.totals.lock().unwrap().insert(query.to_string(), total);
    self
  }

  fn with_delay(self, name: &str, delay: Duration) -> Self {
    self.inner.delays.lock().unwrap().insert(name.to_string(), delay);
    self
  }

  fn fail_next_search(&self, error: FetchError) {
    self.inner.search_failures.lock().unwrap().push_back(error);
  }

  fn search_calls(&self) -> usize {
    self.inner.search_calls.load(Ordering::SeqCst)
  }

  fn detail_calls(&self) -> usize {
    self.inner.detail_calls.load(Ordering::SeqCst)
  }

  fn readme_calls(&self) -> usize {
    self.inner.readme_calls.load(Ordering::SeqCst)
  }

  async fn pause(&self, name: &str) {
    let delay = self
      .inner
      .delays
      .lock()
      .unwrap()
      .get(name)
      .copied()
      .unwrap_or(Duration::from_millis(10));
    tokio::time::sleep(delay).await;
  }
}

impl RepoSource for MemorySource {
  async fn search_repositories(
    &self,
    params: &SearchParams,
  ) -> Result<Vec<RepoSummary>, FetchError> {
    self.inner.search_calls.fetch_add(1, Ordering::SeqCst);
    self.pause(&params.query).await;
    if let Some(error) = self.inner.search_failures.lock().unwrap().pop_front() {
      return Err(error);
    }

    let total = self.inner.totals.lock().unwrap().get(&params.query).copied().unwrap_or(30);
    let start = params.page.saturating_sub(1) * params.page_size;
    let end = (start + params.page_size).min(total);
    Ok(
      (start..end)
        .map(|i| RepoSummary {
          id: RepoId(i as u64),
          full_name: format!("{}/repo-{}", params.query, i),
          owner_login: params.query.clone(),
          stars: 100 - i as u64,
          description: None,
          primary_language: None,
          topics: Vec::new(),
          github_url: None,
          owner_avatar_url: None,
          similarity: None,
        })
        .collect(),
    )
  }

  async fn get_project_details(&self, id: RepoId) -> Result<RepoDetail, FetchError> {
    self.inner.detail_calls.fetch_add(1, Ordering::SeqCst);
    self.pause(&id.to_string()).await;
    Ok(RepoDetail {
      id,
      full_name: format!("acme/repo-{}", id),
      owner_login: "acme".to_string(),
      stars: 1,
      forks: 0,
      watchers: 0,
      open_issues: 0,
      description: None,
      primary_language: Some("Rust".to_string()),
      topics: Vec::new(),
      github_url: None,
      owner_url: None,
      owner_avatar_url: None,
      languages_breakdown: Default::default(),
      pushed_at_github: None,
    })
  }

  async fn get_project_readme(&self, id: RepoId) -> Result<String, FetchError> {
    self.inner.readme_calls.fetch_add(1, Ordering::SeqCst);
    self.pause(&id.to_string()).await;
    Ok(format!("# repo {}", id))
  }
}

fn options() -> FetchOptions {
  FetchOptions {
    stale_time: Duration::from_secs(60),
    gc_time: Duration::from_secs(120),
    retry_count: 1,
  }
}

fn session(source: &MemorySource) -> Session {
  Session::new(source.clone(), AppState::default(), StorePolicy::default(), options())
}

fn rust_page(page: u32) -> SearchKey {
  SearchKey(SearchParams {
    query: "rust".to_string(),
    language: String::new(),
    min_stars: None,
    topics: String::new(),
    page,
    page_size: 12,
  })
}

fn names(session: &Session) -> Vec<String> {
  session
    .search()
    .data()
    .map(|results| results.iter().map(|r| r.full_name.clone()).collect())
    .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn test_superseded_search_never_shows() {
  let source = MemorySource::default().with_delay("rust", Duration::from_millis(500));
  let mut session = session(&source);

  session.dispatch(Action::SetSearchQuery("rust".into()));
  session.dispatch(Action::SetPage(3));
  assert!(session.search().is_loading());
  session.dispatch(Action::SetSearchQuery("go".into()));

  // New query resets the page in the same transition
  assert_eq!(session.state().pagination.page, 1);

  session.settle().await;
  assert_eq!(names(&session)[0], "go/repo-0");

  // The slow rust requests land afterwards and are ignored
  tokio::time::sleep(Duration::from_secs(1)).await;
  assert!(!session.poll());
  assert_eq!(names(&session)[0], "go/repo-0");

  // but still fill the cache
  let entry = session.caches().search.peek(&rust_page(3)).unwrap();
  assert_eq!(entry.status, CacheStatus::Fresh);
  assert_eq!(entry.value.unwrap()[0].full_name, "rust/repo-24");
}

#[tokio::test(start_paused = true)]
async fn test_reselection_shows_latest_repository() {
  let source = MemorySource::default().with_delay("42", Duration::from_millis(500));
  let mut session = session(&source);

  session.dispatch(Action::SetSelectedId(RepoId(42)));
  assert!(session.detail().is_loading());
  assert!(session.readme().is_loading());
  session.dispatch(Action::SetSelectedId(RepoId(43)));

  session.settle().await;
  assert_eq!(session.detail().data().unwrap().id, RepoId(43));
  assert_eq!(session.readme().data().unwrap(), "# repo 43");

  tokio::time::sleep(Duration::from_secs(1)).await;
  session.poll();
  assert_eq!(session.detail().data().unwrap().id, RepoId(43));

  session.dispatch(Action::ClearSelected);
  assert!(session.detail().state().is_idle());
  assert!(session.readme().state().is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_next_page_follows_page_fullness() {
  let source = MemorySource::default().with_total("tiny", 5);
  let mut session = session(&source);

  session.dispatch(Action::SetSearchQuery("rust".into()));
  assert!(!session.has_next_page());
  session.settle().await;
  assert!(session.has_next_page());
  assert!(!session.has_previous_page());

  assert!(session.next_page());
  session.settle().await;
  session.dispatch(Action::SetPage(3));
  session.settle().await;
  // 30 results, 12 per page: the third page has 6
  assert_eq!(names(&session).len(), 6);
  assert!(!session.has_next_page());
  assert!(session.has_previous_page());

  session.dispatch(Action::SetSearchQuery("tiny".into()));
  session.settle().await;
  assert_eq!(names(&session).len(), 5);
  assert!(!session.has_next_page());
}

#[tokio::test(start_paused = true)]
async fn test_sessions_sharing_caches_coalesce() {
  let source = MemorySource::default();
  let caches = Caches::new();
  let mut a = Session::with_caches(
    source.clone(),
    AppState::default(),
    StorePolicy::default(),
    options(),
    caches.clone(),
  );
  let mut b = Session::with_caches(
    source.clone(),
    AppState::default(),
    StorePolicy::default(),
    options(),
    caches,
  );

  a.dispatch(Action::SetSearchQuery("rust".into()));
  b.dispatch(Action::SetSearchQuery("rust".into()));
  a.dispatch(Action::SetSelectedId(RepoId(7)));
  b.dispatch(Action::SetSelectedId(RepoId(7)));
  a.settle().await;
  b.settle().await;

  assert_eq!(source.search_calls(), 1);
  assert_eq!(source.detail_calls(), 1);
  assert_eq!(source.readme_calls(), 1);
  assert_eq!(names(&a), names(&b));
}

#[tokio::test(start_paused = true)]
async fn test_revisiting_fresh_page_does_not_refetch() {
  let source = MemorySource::default();
  let mut session = session(&source);

  session.dispatch(Action::SetSearchQuery("rust".into()));
  session.settle().await;
  session.dispatch(Action::SetPage(2));
  session.settle().await;
  session.dispatch(Action::SetPage(1));

  // Served straight from the cache
  assert!(session.search().state().is_success());
  assert!(!session.search().is_fetching());
  assert_eq!(source.search_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_data_shown_while_revalidating() {
  let source = MemorySource::default();
  let mut session = session(&source);

  session.dispatch(Action::SetSearchQuery("rust".into()));
  session.settle().await;

  tokio::time::sleep(Duration::from_secs(61)).await;
  session.refresh();
  assert_eq!(names(&session)[0], "rust/repo-0");
  assert!(session.search().is_fetching());

  session.settle().await;
  assert!(!session.search().is_fetching());
  assert_eq!(source.search_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unobserved_entries_collected_on_tick() {
  let source = MemorySource::default();
  let mut session = session(&source);

  session.dispatch(Action::SetSearchQuery("rust".into()));
  session.settle().await;
  session.dispatch(Action::SetSearchQuery(String::new()));
  assert!(session.search().state().is_idle());

  tokio::time::sleep(Duration::from_secs(60)).await;
  session.tick();
  assert_eq!(session.caches().search.len(), 1);

  tokio::time::sleep(Duration::from_secs(61)).await;
  session.tick();
  assert!(session.caches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_observed_entries_survive_gc() {
  let source = MemorySource::default();
  let mut session = session(&source);

  session.dispatch(Action::SetSearchQuery("rust".into()));
  session.settle().await;

  tokio::time::sleep(Duration::from_secs(600)).await;
  session.tick();
  assert_eq!(session.caches().search.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_retried_then_sticky() {
  let source = MemorySource::default();
  source.fail_next_search(FetchError::http(503, "unavailable"));
  let mut session = session(&source);

  session.dispatch(Action::SetSearchQuery("rust".into()));
  session.settle().await;
  assert!(session.search().state().is_success());
  assert_eq!(source.search_calls(), 2);

  source.fail_next_search(FetchError::http(503, "unavailable"));
  source.fail_next_search(FetchError::http(503, "still unavailable"));
  session.dispatch(Action::SetSearchQuery("go".into()));
  session.settle().await;
  let error = session.search().error().unwrap();
  assert_eq!(error.kind, ErrorKind::Http(503));
  assert_eq!(error.message, "still unavailable");

  // Plain revalidation keeps the error
  session.refresh();
  assert!(session.search().is_error());
  assert_eq!(source.search_calls(), 4);

  assert_eq!(session.retry(), 1);
  session.settle().await;
  assert!(session.search().state().is_success());
  assert_eq!(source.search_calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_failed_query_refetched_after_returning_to_it() {
  let source = MemorySource::default();
  let options = FetchOptions {
    retry_count: 0,
    ..options()
  };
  let mut session =
    Session::new(source.clone(), AppState::default(), StorePolicy::default(), options);

  source.fail_next_search(FetchError::network("connection reset"));
  session.dispatch(Action::SetSearchQuery("go".into()));
  session.settle().await;
  assert!(session.search().is_error());

  session.dispatch(Action::SetSearchQuery("rust".into()));
  session.settle().await;
  assert!(session.search().state().is_success());

  session.dispatch(Action::SetSearchQuery("go".into()));
  assert!(session.search().is_loading());
  session.settle().await;
  assert_eq!(names(&session)[0], "go/repo-0");
  assert_eq!(source.search_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_filter_edit_page_policy() {
  let source = MemorySource::default();
  let mut keeps = session(&source);
  keeps.dispatch(Action::SetSearchQuery("rust".into()));
  keeps.dispatch(Action::SetPage(2));
  keeps.dispatch(Action::SetFilter(FilterUpdate::Language("Rust".into())));
  assert_eq!(keeps.state().pagination.page, 2);

  let mut resets = Session::new(
    source.clone(),
    AppState::new(NonZeroU32::new(12).unwrap()),
    StorePolicy {
      filter_edit_resets_page: true,
    },
    options(),
  );
  resets.dispatch(Action::SetSearchQuery("rust".into()));
  resets.dispatch(Action::SetPage(2));
  resets.dispatch(Action::SetFilter(FilterUpdate::Language("Rust".into())));
  assert_eq!(resets.state().pagination.page, 1);
}

#[tokio::test(start_paused = true)]
async fn test_direct_store_changes_picked_up_on_poll() {
  let source = MemorySource::default();
  let mut session = session(&source);

  session.store().set_search_query("rust");
  assert!(session.search().state().is_idle());
  assert!(session.poll());
  assert!(session.search().is_loading());

  session.settle().await;
  assert_eq!(names(&session).len(), 12);
}
