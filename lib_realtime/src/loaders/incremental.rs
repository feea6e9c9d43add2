//! # Incremental Loader
//!
//! State machine per instance: `Idle -> Loading -> (Idle | Exhausted)`.
//!
//! - `load_more` is a no-op while `Loading` or `Exhausted`. The check and the
//!   switch to `Loading` happen under one lock, so two racing calls produce
//!   exactly one fetch.
//! - An empty page exhausts the loader until the next `refresh`.
//! - A failed fetch is logged and returns the loader to `Idle` with nothing
//!   appended and the page number unchanged, so a later call retries it.
//! - `refresh` starts a new generation: it clears the list, rewinds to page 1
//!   and seeds the list from that page. A fetch from an older generation that
//!   completes afterwards is discarded.
//! - `refresh` is the one exception to the at-most-one-fetch rule: it does
//!   not wait for an in-flight `load_more`, whose page is then discarded.
//! - A `load_more` or `refresh` future dropped mid-fetch returns the loader
//!   to `Idle` unless a newer generation already took over.
//! - After `teardown` every completion is discarded and every call skipped.
//!
//! Errors never propagate out of the loader; callers that want to show them
//! wrap their page source.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::loaders::page_source::PageSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderPhase {
    Idle,
    Loading,
    /// Terminal until `refresh`.
    Exhausted,
}

/// What a single `load_more`/`refresh` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// `load_more` appended this many items.
    Appended(usize),
    /// `refresh` replaced the list with this many items.
    Seeded(usize),
    /// The page came back empty.
    Exhausted,
    /// The fetch failed; the loader is idle again.
    Failed,
    /// A fetch was already in flight, the list is exhausted, or the loader is torn down.
    Skipped,
    /// The result arrived for a superseded generation or a torn-down loader.
    Discarded,
}

#[derive(Clone, Copy)]
enum Apply {
    Append,
    Seed,
}

struct Cursor<T> {
    items: Vec<T>,
    page: u32,
    phase: LoaderPhase,
    generation: u64,
    dependencies: Option<u64>,
}

pub struct IncrementalLoader<T> {
    source: Arc<dyn PageSource<T>>,
    cursor: Mutex<Cursor<T>>,
    alive: AtomicBool,
}

/// Held across a fetch; frees the loader if the future is dropped before
/// the page settles.
struct InFlight<'a, T> {
    loader: &'a IncrementalLoader<T>,
    generation: u64,
    settled: bool,
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut cursor = self.loader.lock();
        if cursor.generation == self.generation && cursor.phase == LoaderPhase::Loading {
            log::debug!("Fetch for generation {} dropped; loader idle again", self.generation);
            cursor.phase = LoaderPhase::Idle;
        }
    }
}

impl<T: Send + 'static> IncrementalLoader<T> {
    pub fn new(source: impl PageSource<T> + 'static) -> Self {
        Self::from_source(Arc::new(source))
    }

    pub fn from_source(source: Arc<dyn PageSource<T>>) -> Self {
        Self {
            source,
            cursor: Mutex::new(Cursor {
                items: Vec::new(),
                page: 1,
                phase: LoaderPhase::Idle,
                generation: 0,
                dependencies: None,
            }),
            alive: AtomicBool::new(true),
        }
    }

    /// Fetches the next page and appends it.
    pub async fn load_more(&self) -> LoadOutcome {
        let (page, generation) = {
            let mut cursor = self.lock();
            if !self.is_alive() || cursor.phase != LoaderPhase::Idle {
                return LoadOutcome::Skipped;
            }
            cursor.phase = LoaderPhase::Loading;
            (cursor.page, cursor.generation)
        };

        log::debug!("Loading page {}", page);
        let mut in_flight = InFlight {
            loader: self,
            generation,
            settled: false,
        };
        let result = self.source.fetch_page(page).await;
        in_flight.settled = true;
        self.settle(generation, page, result, Apply::Append)
    }

    /// Clears the list, rewinds to page 1 and seeds it with that page.
    ///
    /// Runs even while a `load_more` is in flight; that fetch's result is
    /// discarded when it lands.
    pub async fn refresh(&self) -> LoadOutcome {
        let generation = {
            let mut cursor = self.lock();
            if !self.is_alive() {
                return LoadOutcome::Skipped;
            }
            cursor.generation += 1;
            cursor.items.clear();
            cursor.page = 1;
            cursor.phase = LoaderPhase::Loading;
            cursor.generation
        };

        log::debug!("Refreshing from page 1 (generation {})", generation);
        let mut in_flight = InFlight {
            loader: self,
            generation,
            settled: false,
        };
        let result = self.source.fetch_page(1).await;
        in_flight.settled = true;
        self.settle(generation, 1, result, Apply::Seed)
    }

    /// Refreshes when `dependencies` differ from the last call (the first
    /// call always refreshes). Returns `None` when nothing changed.
    pub async fn set_dependencies<D: Hash + ?Sized>(&self, dependencies: &D) -> Option<LoadOutcome> {
        let mut hasher = DefaultHasher::new();
        dependencies.hash(&mut hasher);
        let fingerprint = hasher.finish();

        {
            let mut cursor = self.lock();
            if cursor.dependencies == Some(fingerprint) {
                return None;
            }
            cursor.dependencies = Some(fingerprint);
        }
        Some(self.refresh().await)
    }

    /// The sentinel-visibility hook.
    pub async fn on_visible(&self) -> LoadOutcome {
        self.load_more().await
    }

    /// Marks the loader dead; pending fetches resolve into nothing.
    pub fn teardown(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> LoaderPhase {
        self.lock().phase
    }

    pub fn has_more(&self) -> bool {
        self.phase() != LoaderPhase::Exhausted
    }

    pub fn is_loading(&self) -> bool {
        self.phase() == LoaderPhase::Loading
    }

    /// The page number the next `load_more` will request.
    pub fn page(&self) -> u32 {
        self.lock().page
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    fn settle(&self, generation: u64, page: u32, result: anyhow::Result<Vec<T>>, apply: Apply) -> LoadOutcome {
        let mut cursor = self.lock();
        if !self.is_alive() {
            log::debug!("Discarding page {}: loader torn down", page);
            return LoadOutcome::Discarded;
        }
        if cursor.generation != generation {
            log::debug!("Discarding page {}: superseded by a refresh", page);
            return LoadOutcome::Discarded;
        }

        match result {
            Ok(batch) if batch.is_empty() => {
                log::debug!("Page {} is empty; list exhausted", page);
                cursor.phase = LoaderPhase::Exhausted;
                LoadOutcome::Exhausted
            }
            Ok(batch) => {
                let count = batch.len();
                match apply {
                    Apply::Append => cursor.items.extend(batch),
                    Apply::Seed => cursor.items = batch,
                }
                cursor.page = page + 1;
                cursor.phase = LoaderPhase::Idle;
                match apply {
                    Apply::Append => LoadOutcome::Appended(count),
                    Apply::Seed => LoadOutcome::Seeded(count),
                }
            }
            Err(e) => {
                log::warn!("Failed to load page {}: {:#}", page, e);
                cursor.phase = LoaderPhase::Idle;
                LoadOutcome::Failed
            }
        }
    }
}

impl<T> IncrementalLoader<T> {
    fn lock(&self) -> MutexGuard<'_, Cursor<T>> {
        self.cursor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + Send + 'static> IncrementalLoader<T> {
    /// Copy of the accumulated items, in page order.
    pub fn items(&self) -> Vec<T> {
        self.lock().items.clone()
    }
}
