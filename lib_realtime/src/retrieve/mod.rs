//! # Data Retrieval Module
//!
//! HTTP plumbing for the list views. `ky_http` wraps `reqwest` with retry
//! middleware; `page_source` turns a paginated REST endpoint into a
//! [`PageSource`](crate::loaders::PageSource) for the incremental loader.

/// Generic HTTP API client with retry middleware.
pub mod ky_http;

/// REST-backed page source for `IncrementalLoader`.
pub mod page_source;

pub use ky_http::{ApiClient, ApiResponse, RetrieveError};
pub use page_source::RestPageSource;
