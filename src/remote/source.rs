use std::future::Future;

use crate::error::FetchError;
use crate::remote::types::{RepoDetail, RepoId, RepoSummary, SearchParams};

/// The three data primitives the bindings fetch through.
///
/// [`RemoteClient`](super::RemoteClient) talks to the search service; tests
/// plug in in-memory sources.
pub trait RepoSource: Clone + Send + Sync + 'static {
  /// One page of search results, in ranking order.
  fn search_repositories(
    &self,
    params: &SearchParams,
  ) -> impl Future<Output = Result<Vec<RepoSummary>, FetchError>> + Send;

  /// Details of one repository; `NotFound` when the id is unknown.
  fn get_project_details(
    &self,
    id: RepoId,
  ) -> impl Future<Output = Result<RepoDetail, FetchError>> + Send;

  /// Raw README text; empty when the repository has none.
  fn get_project_readme(
    &self,
    id: RepoId,
  ) -> impl Future<Output = Result<String, FetchError>> + Send;
}
