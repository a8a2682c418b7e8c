//! # wpsync
//!
//! Incremental, page-by-page retrieval of posts from a WordPress-compatible
//! XML endpoint.
//!
//! ## Architecture
//!
//! ```text
//! Syncer → FetchRequest → Fetcher → FetchResult → XmlValue → Normalizer → Post → SyncDelegate
//! ```
//!
//! Pages are fetched strictly one at a time. Each page is decoded before the
//! next one is requested; an empty page ends the run.
//!
//! ## Quick Start
//!
//! ```bash
//! # Fetch every post in category 7
//! wpsync --server https://blog.example.com/wp-xml --category 7 sync
//!
//! # Inspect the decoded structure of page 2
//! wpsync --server https://blog.example.com/wp-xml page 2
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires configuration and the
/// HTTP fetcher into [`Syncer`](sync::Syncer)s.
pub mod app;

/// Command-line interface using clap.
///
/// - `sync` - Fetch all pages, printing posts as they arrive
/// - `page <n>` - Dump one decoded page as JSON
/// - `config` - Show the config file path
pub mod cli;

/// Configuration loaded from `~/.config/wpsync/config.toml`.
pub mod config;

/// Core domain model: [`Post`](domain::Post).
pub mod domain;

/// Single HTTP transfers.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for one GET request
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
/// - [`FetchResult`](fetcher::FetchResult): body with text and XML views
pub mod fetcher;

/// Maps decoded pages to [`Post`](domain::Post)s.
pub mod normalizer;

/// The paging loop: [`Syncer`](sync::Syncer) and its delegate interface.
pub mod sync;

/// Generic XML-to-dictionary decoding.
pub mod xml;
