//! Client side of the repository search service.

pub mod api_types;
pub mod cache;
pub mod client;
pub mod source;
pub mod types;

pub use cache::{DetailKey, ReadmeKey, SearchKey};
pub use client::RemoteClient;
pub use source::RepoSource;
pub use types::{LanguageShare, RepoDetail, RepoId, RepoSummary, SearchParams};
