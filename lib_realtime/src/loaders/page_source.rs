use std::future::Future;

use async_trait::async_trait;

/// Fetches one page of a list. Pages are numbered from 1.
///
/// An empty page is the only exhaustion signal the loader understands;
/// sources that know a total count must translate it into an empty page.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(&self, page: u32) -> anyhow::Result<Vec<T>>;
}

/// Plain async closures are page sources.
#[async_trait]
impl<T, F, Fut> PageSource<T> for F
where
    T: Send + 'static,
    F: Fn(u32) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
{
    async fn fetch_page(&self, page: u32) -> anyhow::Result<Vec<T>> {
        (self)(page).await
    }
}
