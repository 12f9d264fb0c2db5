//! Reactive state and fetch cache for a repository search client.
//!
//! A [`session::Session`] owns the [`store::StateStore`] holding the search
//! criteria, pagination and selection, and three [`query::QueryBinding`]s that
//! derive cache keys from that state. Bindings share entries through
//! [`cache::FetchCache`], which coalesces concurrent requests, keeps data fresh
//! for a configurable time and collects entries nobody observes.

pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod query;
pub mod remote;
pub mod session;
pub mod store;
