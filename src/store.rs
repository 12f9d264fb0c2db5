//! Session state for the search interface and the actions that change it.
//!
//! State changes only through [`Action`]s. Each action is a pure transition
//! from one [`AppState`] to the next, applied atomically by [`StateStore`] and
//! published to subscribers, so consumers never observe a half-applied change
//! such as a new query still paired with the old page.

use std::num::NonZeroU32;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::remote::RepoId;

/// Default number of results per page
pub const DEFAULT_PAGE_SIZE: NonZeroU32 = match NonZeroU32::new(12) {
  Some(n) => n,
  None => unreachable!(),
};

/// Search filters. Empty strings and `None` mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
  pub language: String,
  pub min_stars: Option<u32>,
  /// Comma-separated topic list
  pub topics: String,
}

impl Filters {
  pub fn is_empty(&self) -> bool {
    self.language.is_empty() && self.min_stars.is_none() && self.topics.is_empty()
  }

  /// Set one field.
  pub fn apply(&mut self, update: FilterUpdate) {
    match update {
      FilterUpdate::Language(language) => self.language = language,
      FilterUpdate::MinStars(min_stars) => self.min_stars = min_stars,
      FilterUpdate::Topics(topics) => self.topics = topics,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
  pub query_text: String,
  pub filters: Filters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
  /// 1-based page number
  pub page: u32,
  pub page_size: NonZeroU32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
  pub selected_id: Option<RepoId>,
}

/// Everything the bindings derive their keys from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
  pub criteria: SearchCriteria,
  pub pagination: Pagination,
  pub selection: Selection,
}

impl Default for AppState {
  fn default() -> Self {
    Self::new(DEFAULT_PAGE_SIZE)
  }
}

/// Update of a single filter field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterUpdate {
  Language(String),
  MinStars(Option<u32>),
  Topics(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseFilterError {
  #[error("expected <name>=<value>, got '{0}'")]
  MissingValue(String),
  #[error("unknown filter '{0}' (expected language, min_stars or topics)")]
  UnknownField(String),
  #[error("min_stars must be a non-negative number, got '{0}'")]
  InvalidStars(String),
}

impl FromStr for FilterUpdate {
  type Err = ParseFilterError;

  /// Parse `name=value`. An empty value clears the field.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (name, value) = s
      .split_once('=')
      .ok_or_else(|| ParseFilterError::MissingValue(s.to_string()))?;
    let value = value.trim();

    match name.trim().to_lowercase().as_str() {
      "language" | "lang" => Ok(FilterUpdate::Language(value.to_string())),
      "min_stars" | "stars" => {
        if value.is_empty() {
          return Ok(FilterUpdate::MinStars(None));
        }
        value
          .parse()
          .map(|n| FilterUpdate::MinStars(Some(n)))
          .map_err(|_| ParseFilterError::InvalidStars(value.to_string()))
      }
      "topics" | "topic" => Ok(FilterUpdate::Topics(value.to_string())),
      other => Err(ParseFilterError::UnknownField(other.to_string())),
    }
  }
}

/// State-changing actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  /// New query text; back to page 1
  SetSearchQuery(String),
  /// Replace the whole filter set; back to page 1
  SetFilters(Filters),
  /// Change one filter field; page reset depends on [`StorePolicy`]
  SetFilter(FilterUpdate),
  /// Remove all filters; back to page 1
  ClearFilters,
  SetSelectedId(RepoId),
  ClearSelected,
  /// Jump to a page, unchecked
  SetPage(u32),
  /// New page size; back to page 1
  SetPageSize(NonZeroU32),
}

/// Tunable transition rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorePolicy {
  /// Whether a single-field filter edit also resets the page
  pub filter_edit_resets_page: bool,
}

impl AppState {
  pub fn new(page_size: NonZeroU32) -> Self {
    Self {
      criteria: SearchCriteria::default(),
      pagination: Pagination { page: 1, page_size },
      selection: Selection::default(),
    }
  }

  /// The state that results from applying `action`.
  pub fn transition(&self, action: &Action, policy: &StorePolicy) -> AppState {
    let mut next = self.clone();
    match action {
      Action::SetSearchQuery(text) => {
        next.criteria.query_text = text.clone();
        next.pagination.page = 1;
      }
      Action::SetFilters(filters) => {
        next.criteria.filters = filters.clone();
        next.pagination.page = 1;
      }
      Action::SetFilter(update) => {
        next.criteria.filters.apply(update.clone());
        if policy.filter_edit_resets_page {
          next.pagination.page = 1;
        }
      }
      Action::ClearFilters => {
        next.criteria.filters = Filters::default();
        next.pagination.page = 1;
      }
      Action::SetSelectedId(id) => next.selection.selected_id = Some(*id),
      Action::ClearSelected => next.selection.selected_id = None,
      Action::SetPage(page) => next.pagination.page = *page,
      Action::SetPageSize(size) => {
        next.pagination.page_size = *size;
        next.pagination.page = 1;
      }
    }
    next
  }
}

/// Constructible state container. Each action is one atomic, observable
/// transition; actions that change nothing notify nobody.
pub struct StateStore {
  tx: watch::Sender<AppState>,
  policy: StorePolicy,
}

impl StateStore {
  pub fn new(initial: AppState, policy: StorePolicy) -> Self {
    let (tx, _rx) = watch::channel(initial);
    Self { tx, policy }
  }

  /// Apply `action`. Returns whether the state changed.
  pub fn dispatch(&self, action: Action) -> bool {
    let policy = self.policy;
    self.tx.send_if_modified(|state| {
      let next = state.transition(&action, &policy);
      if next == *state {
        return false;
      }
      debug!(?action, page = next.pagination.page, "state transition");
      *state = next;
      true
    })
  }

  /// Copy of the current state.
  pub fn snapshot(&self) -> AppState {
    self.tx.borrow().clone()
  }

  /// Receiver notified after every state change.
  pub fn subscribe(&self) -> watch::Receiver<AppState> {
    self.tx.subscribe()
  }

  pub fn policy(&self) -> StorePolicy {
    self.policy
  }

  pub fn set_search_query(&self, text: impl Into<String>) -> bool {
    self.dispatch(Action::SetSearchQuery(text.into()))
  }

  pub fn set_filters(&self, filters: Filters) -> bool {
    self.dispatch(Action::SetFilters(filters))
  }

  pub fn set_filter(&self, update: FilterUpdate) -> bool {
    self.dispatch(Action::SetFilter(update))
  }

  pub fn clear_filters(&self) -> bool {
    self.dispatch(Action::ClearFilters)
  }

  pub fn set_selected_id(&self, id: RepoId) -> bool {
    self.dispatch(Action::SetSelectedId(id))
  }

  pub fn clear_selected(&self) -> bool {
    self.dispatch(Action::ClearSelected)
  }

  pub fn set_page(&self, page: u32) -> bool {
    self.dispatch(Action::SetPage(page))
  }

  pub fn set_page_size(&self, size: NonZeroU32) -> bool {
    self.dispatch(Action::SetPageSize(size))
  }
}
