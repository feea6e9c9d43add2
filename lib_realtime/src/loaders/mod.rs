//! # Incremental Loading
//!
//! Cursor-based pagination used by every infinite-scroll list. A loader is
//! bound to a [`PageSource`] (any async `fetch_page(page) -> Vec<T>`),
//! requests pages strictly in increasing order with at most one fetch in
//! flight, and treats the first empty page as exhaustion.
//!
//! [`SentinelObserver`] wires a loader to a visibility signal so that a UI
//! sentinel element becoming visible triggers `load_more`.

/// The page-fetch seam.
pub mod page_source;
/// The loader state machine.
pub mod incremental;
/// Visibility-driven triggering.
pub mod sentinel;

pub use incremental::{IncrementalLoader, LoadOutcome, LoaderPhase};
pub use page_source::PageSource;
pub use sentinel::SentinelObserver;
