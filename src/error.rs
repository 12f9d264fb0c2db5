//! Structured fetch errors surfaced to bindings and consumers.
//!
//! Every failure a fetch can produce ends up as a [`FetchError`]: a kind plus a
//! human readable message. Errors are `Clone` because a single in-flight request
//! hands the same outcome to every coalesced caller.

use std::fmt;
use thiserror::Error;

/// Category of a fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Transport-level failure (connection refused, timeout, reset).
  Network,
  /// Non-success HTTP status other than a missing resource.
  Http(u16),
  /// The requested entity does not exist.
  NotFound,
  /// Response body did not match the expected schema.
  Parse,
  /// The fetch task ended without producing a result.
  Interrupted,
}

impl ErrorKind {
  /// Whether a failed attempt with this kind may be retried.
  ///
  /// Network failures and 5xx responses are transient; client errors, missing
  /// entities and malformed bodies will fail the same way again.
  pub fn is_retryable(self) -> bool {
    match self {
      ErrorKind::Network => true,
      ErrorKind::Http(status) => (500..600).contains(&status),
      ErrorKind::NotFound | ErrorKind::Parse | ErrorKind::Interrupted => false,
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorKind::Network => write!(f, "network error"),
      ErrorKind::Http(status) => write!(f, "http error {}", status),
      ErrorKind::NotFound => write!(f, "not found"),
      ErrorKind::Parse => write!(f, "parse error"),
      ErrorKind::Interrupted => write!(f, "interrupted"),
    }
  }
}

/// A fetch failure: `{kind, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
  pub kind: ErrorKind,
  pub message: String,
}

impl FetchError {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }

  pub fn network(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Network, message)
  }

  pub fn http(status: u16, message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Http(status), message)
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::NotFound, message)
  }

  pub fn parse(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Parse, message)
  }

  pub fn interrupted(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Interrupted, message)
  }

  pub fn is_retryable(&self) -> bool {
    self.kind.is_retryable()
  }
}
