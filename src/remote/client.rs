use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::remote::api_types::{parse_project_detail, parse_search_results, ApiErrorBody};
use crate::remote::source::RepoSource;
use crate::remote::types::{RepoDetail, RepoId, RepoSummary, SearchParams};

/// Search service API client
#[derive(Clone)]
pub struct RemoteClient {
  http: reqwest::Client,
  /// Service root, always ending in '/'
  base: Url,
}

impl RemoteClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let base = base_url(&config.url)?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(concat!("repolens/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  /// URL of a search request. Empty criteria are left out; paging is always sent.
  pub fn search_url(&self, params: &SearchParams) -> Result<Url, FetchError> {
    let mut url = self.endpoint("api/v1/search")?;
    {
      let mut query = url.query_pairs_mut();
      if !params.query.is_empty() {
        query.append_pair("query", &params.query);
      }
      if !params.language.is_empty() {
        query.append_pair("language", &params.language);
      }
      if let Some(min_stars) = params.min_stars.filter(|&n| n > 0) {
        query.append_pair("min_stars", &min_stars.to_string());
      }
      if !params.topics.is_empty() {
        query.append_pair("topics", &params.topics);
      }
      query.append_pair("page", &params.page.to_string());
      query.append_pair("page_size", &params.page_size.to_string());
    }
    Ok(url)
  }

  pub fn project_url(&self, id: RepoId) -> Result<Url, FetchError> {
    self.endpoint(&format!("api/v1/projects/{}", id))
  }

  pub fn readme_url(&self, id: RepoId) -> Result<Url, FetchError> {
    self.endpoint(&format!("api/v1/projects/{}/readme", id))
  }

  fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
    self
      .base
      .join(path)
      .map_err(|e| FetchError::network(format!("Invalid endpoint {}: {}", path, e)))
  }

  /// GET `url` and return the status with the full body.
  async fn get_text(&self, url: Url) -> Result<(StatusCode, String), FetchError> {
    debug!(%url, "GET");
    let response = self
      .http
      .get(url.clone())
      .send()
      .await
      .map_err(|e| FetchError::network(format!("Request to {} failed: {}", url, e)))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| FetchError::network(format!("Failed to read response from {}: {}", url, e)))?;
    debug!(%url, status = status.as_u16(), bytes = body.len(), "response");

    Ok((status, body))
  }
}

impl RepoSource for RemoteClient {
  async fn search_repositories(
    &self,
    params: &SearchParams,
  ) -> Result<Vec<RepoSummary>, FetchError> {
    let (status, body) = self.get_text(self.search_url(params)?).await?;
    if !status.is_success() {
      return Err(http_error(status, &body));
    }
    parse_search_results(&body)
  }

  async fn get_project_details(&self, id: RepoId) -> Result<RepoDetail, FetchError> {
    let (status, body) = self.get_text(self.project_url(id)?).await?;
    match status {
      StatusCode::NOT_FOUND => Err(FetchError::not_found(
        ApiErrorBody::message(&body).unwrap_or_else(|| format!("Project {} not found", id)),
      )),
      s if !s.is_success() => Err(http_error(s, &body)),
      _ => parse_project_detail(&body),
    }
  }

  async fn get_project_readme(&self, id: RepoId) -> Result<String, FetchError> {
    let (status, body) = self.get_text(self.readme_url(id)?).await?;
    match status {
      // A project without a README is not an error
      StatusCode::NOT_FOUND => Ok(String::new()),
      s if !s.is_success() => Err(http_error(s, &body)),
      _ => Ok(body),
    }
  }
}

fn http_error(status: StatusCode, body: &str) -> FetchError {
  let message = ApiErrorBody::message(body).unwrap_or_else(|| "API request failed".to_string());
  FetchError::http(status.as_u16(), message)
}

/// Parse the configured service URL, making sure relative joins keep its path.
fn base_url(raw: &str) -> Result<Url> {
  let mut base =
    Url::parse(raw.trim()).map_err(|e| eyre!("Invalid API URL '{}': {}", raw, e))?;
  if base.cannot_be_a_base() {
    return Err(eyre!("Invalid API URL '{}': not a base URL", raw));
  }
  if !base.path().ends_with('/') {
    let path = format!("{}/", base.path());
    base.set_path(&path);
  }
  Ok(base)
}
