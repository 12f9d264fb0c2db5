//! Generic async-result cache.
//!
//! This module provides a domain-agnostic fetch cache that:
//! - Keys entries by resource kind plus resolved request parameters
//! - Coalesces concurrent requests for the same key into one fetch
//! - Serves stale data immediately and revalidates on the next lookup
//! - Retries transient failures and keeps errors until invalidated
//! - Purges entries nobody has observed for longer than their GC time

mod layer;
mod storage;
mod traits;

pub use layer::{FetchCache, Lookup};
pub use storage::SharedFetch;
pub use traits::{CacheEntry, CacheStatus, FetchOptions, QueryKey};
