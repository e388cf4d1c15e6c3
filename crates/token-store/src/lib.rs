//! Persisted OAuth configuration and auto-refreshing token source
//!
//! `ConfigStore` owns the JSON dotfile holding client credentials, endpoints
//! and the current token. `RefreshingTokenSource` wraps a loaded
//! configuration and refreshes the access token on demand; its `snapshot()`
//! is what gets written back at the end of a run.
//!
//! Lifecycle:
//! 1. `ConfigStore::load()` at process start (`None` until first authentication)
//! 2. `RefreshingTokenSource::new()` over the loaded configuration
//! 3. `TokenSource::token()` from API calls, refreshing when expired
//! 4. `ConfigSink::persist()` with `snapshot()` at process end

pub mod error;
pub mod source;
pub mod store;

pub use error::{Error, Result};
pub use source::{RefreshingTokenSource, TokenSource};
pub use store::{ConfigSink, ConfigStore, PersistedConfiguration};
