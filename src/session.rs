//! One client session: the state store, the shared caches and the three
//! bindings deriving their keys from the store.

use tokio::sync::watch;
use tracing::{debug, info};

use crate::cache::{FetchCache, FetchOptions};
use crate::config::Config;
use crate::error::FetchError;
use crate::query::QueryBinding;
use crate::remote::cache::normalize_topics;
use crate::remote::{
  DetailKey, ReadmeKey, RepoDetail, RepoSource, RepoSummary, SearchKey, SearchParams,
};
use crate::store::{Action, AppState, StateStore, StorePolicy};

pub type SearchBinding = QueryBinding<SearchKey, Vec<RepoSummary>>;
pub type DetailBinding = QueryBinding<DetailKey, RepoDetail>;
pub type ReadmeBinding = QueryBinding<ReadmeKey, String>;

/// The per-payload caches backing a session. Clones share entries.
#[derive(Clone)]
pub struct Caches {
  pub search: FetchCache<Vec<RepoSummary>>,
  pub detail: FetchCache<RepoDetail>,
  pub readme: FetchCache<String>,
}

impl Caches {
  pub fn new() -> Self {
    Self {
      search: FetchCache::new("search"),
      detail: FetchCache::new("detail"),
      readme: FetchCache::new("readme"),
    }
  }

  /// Drop collectable entries from every cache. Returns how many went.
  pub fn collect_garbage(&self) -> usize {
    self.search.collect_garbage() + self.detail.collect_garbage() + self.readme.collect_garbage()
  }

  pub fn len(&self) -> usize {
    self.search.len() + self.detail.len() + self.readme.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for Caches {
  fn default() -> Self {
    Self::new()
  }
}

/// Key for the results page the state describes. `None` while the query is
/// empty. The query text is sent as typed; a zero star filter means none.
pub fn search_key(state: &AppState) -> Option<SearchKey> {
  let query = &state.criteria.query_text;
  if query.is_empty() {
    return None;
  }
  let filters = &state.criteria.filters;
  Some(SearchKey(SearchParams {
    query: query.clone(),
    language: filters.language.trim().to_string(),
    min_stars: filters.min_stars.filter(|&n| n > 0),
    topics: normalize_topics(&filters.topics),
    page: state.pagination.page,
    page_size: state.pagination.page_size.get(),
  }))
}

pub fn detail_key(state: &AppState) -> Option<DetailKey> {
  state.selection.selected_id.map(DetailKey)
}

pub fn readme_key(state: &AppState) -> Option<ReadmeKey> {
  state.selection.selected_id.map(ReadmeKey)
}

pub struct Session {
  store: StateStore,
  state_rx: watch::Receiver<AppState>,
  caches: Caches,
  search: SearchBinding,
  detail: DetailBinding,
  readme: ReadmeBinding,
}

impl Session {
  pub fn new<S: RepoSource>(
    source: S,
    initial: AppState,
    policy: StorePolicy,
    options: FetchOptions,
  ) -> Self {
    Self::with_caches(source, initial, policy, options, Caches::new())
  }

  /// Build a session on existing caches, sharing their entries with every
  /// other holder of a clone.
  pub fn with_caches<S: RepoSource>(
    source: S,
    initial: AppState,
    policy: StorePolicy,
    options: FetchOptions,
    caches: Caches,
  ) -> Self {
    let search = {
      let source = source.clone();
      QueryBinding::new("search", caches.search.clone(), options, move |key: &SearchKey| {
        let source = source.clone();
        let params = key.0.clone();
        async move { source.search_repositories(&params).await }
      })
    };
    let detail = {
      let source = source.clone();
      QueryBinding::new("detail", caches.detail.clone(), options, move |key: &DetailKey| {
        let source = source.clone();
        let id = key.0;
        async move { source.get_project_details(id).await }
      })
    };
    let readme = QueryBinding::new(
      "readme",
      caches.readme.clone(),
      options,
      move |key: &ReadmeKey| {
        let source = source.clone();
        let id = key.0;
        async move { source.get_project_readme(id).await }
      },
    );

    let store = StateStore::new(initial, policy);
    let state_rx = store.subscribe();
    let mut session = Self {
      store,
      state_rx,
      caches,
      search,
      detail,
      readme,
    };
    let state = session.store.snapshot();
    session.apply_state(&state);
    session
  }

  pub fn from_config<S: RepoSource>(source: S, config: &Config) -> Self {
    Self::new(
      source,
      AppState::new(config.search.page_size),
      config.state.policy(),
      config.cache.fetch_options(),
    )
  }

  /// Apply `action` to the store and re-derive the binding keys.
  /// Returns whether the state changed.
  pub fn dispatch(&mut self, action: Action) -> bool {
    let changed = self.store.dispatch(action);
    self.sync();
    changed
  }

  /// Re-derive binding keys if the store changed since the last sync.
  /// Picks up changes made directly through [`Session::store`].
  pub fn sync(&mut self) -> bool {
    if !self.state_rx.has_changed().unwrap_or(false) {
      return false;
    }
    let state = self.state_rx.borrow_and_update().clone();
    self.apply_state(&state);
    true
  }

  /// Sync keys and apply arrived results. Returns whether anything visible
  /// changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = self.sync();
    changed |= self.search.poll();
    changed |= self.detail.poll();
    changed |= self.readme.poll();
    changed
  }

  /// Periodic housekeeping: garbage-collect the caches, then poll.
  pub fn tick(&mut self) -> bool {
    let collected = self.caches.collect_garbage();
    if collected > 0 {
      debug!(collected, "cache entries collected");
    }
    self.poll()
  }

  /// Wait until every binding's outstanding request has settled.
  pub async fn settle(&mut self) {
    self.sync();
    self.search.settle().await;
    self.detail.settle().await;
    self.readme.settle().await;
  }

  /// Revalidate every bound key; only stale entries are refetched.
  pub fn refresh(&mut self) {
    self.search.refresh();
    self.detail.refresh();
    self.readme.refresh();
  }

  /// Refetch every binding currently showing an error. Returns how many.
  pub fn retry(&mut self) -> usize {
    let mut retried = 0;
    if self.search.is_error() {
      self.search.retry();
      retried += 1;
    }
    if self.detail.is_error() {
      self.detail.retry();
      retried += 1;
    }
    if self.readme.is_error() {
      self.readme.retry();
      retried += 1;
    }
    if retried > 0 {
      info!(retried, "retrying failed queries");
    }
    retried
  }

  /// Whether another results page may exist: the current page came back full.
  pub fn has_next_page(&self) -> bool {
    let page_size = self.store.snapshot().pagination.page_size.get() as usize;
    self.search.data().is_some_and(|results| results.len() >= page_size)
  }

  pub fn has_previous_page(&self) -> bool {
    self.store.snapshot().pagination.page > 1
  }

  /// Advance one page when [`Session::has_next_page`] allows it.
  pub fn next_page(&mut self) -> bool {
    if !self.has_next_page() {
      return false;
    }
    let page = self.store.snapshot().pagination.page;
    self.dispatch(Action::SetPage(page.saturating_add(1)))
  }

  pub fn previous_page(&mut self) -> bool {
    if !self.has_previous_page() {
      return false;
    }
    let page = self.store.snapshot().pagination.page;
    self.dispatch(Action::SetPage(page - 1))
  }

  pub fn state(&self) -> AppState {
    self.store.snapshot()
  }

  pub fn store(&self) -> &StateStore {
    &self.store
  }

  pub fn caches(&self) -> &Caches {
    &self.caches
  }

  pub fn search(&self) -> &SearchBinding {
    &self.search
  }

  pub fn detail(&self) -> &DetailBinding {
    &self.detail
  }

  pub fn readme(&self) -> &ReadmeBinding {
    &self.readme
  }

  /// First error among the bindings, search first.
  pub fn first_error(&self) -> Option<&FetchError> {
    self
      .search
      .error()
      .or_else(|| self.detail.error())
      .or_else(|| self.readme.error())
  }

  fn apply_state(&mut self, state: &AppState) {
    self.search.set_key(search_key(state));
    self.detail.set_key(detail_key(state));
    self.readme.set_key(readme_key(state));
  }
}
