//! # REST Page Source
//!
//! Adapts a paginated REST list endpoint to `PageSource`. Each page is a
//! `GET <path>?page=<n>&limit=<size>`; the body may be a bare array or an
//! envelope with a `data` array.

use std::marker::PhantomData;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::loaders::PageSource;
use crate::retrieve::ky_http::{ApiClient, RetrieveError};

/// Either a bare JSON array or an envelope with a `data` array.
#[derive(Deserialize)]
#[serde(untagged)]
enum PageBody<T> {
    Bare(Vec<T>),
    Enveloped { data: Vec<T> },
}

impl<T> PageBody<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            PageBody::Bare(items) | PageBody::Enveloped { data: items } => items,
        }
    }
}

/// Serves pages from `GET <path>?page=<n>&limit=<page_size>`.
pub struct RestPageSource<T> {
    client: ApiClient,
    path: String,
    page_size: u32,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> RestPageSource<T> {
    pub fn new(client: ApiClient, path: impl Into<String>, page_size: u32) -> Self {
        Self {
            client,
            path: path.into(),
            page_size: page_size.max(1),
            _item: PhantomData,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub async fn fetch(&self, page: u32) -> Result<Vec<T>, RetrieveError> {
        let url = self.client.url_for(
            &self.path,
            &[("page", page.to_string()), ("limit", self.page_size.to_string())],
        )?;
        log::debug!("Fetching page {} from {}", page, url);

        let body = self
            .client
            .request_url::<PageBody<T>, ()>(Method::GET, url, None, None)
            .await?
            .into_result()?;
        Ok(body.into_items())
    }
}

#[async_trait]
impl<T> PageSource<T> for RestPageSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_page(&self, page: u32) -> anyhow::Result<Vec<T>> {
        Ok(self.fetch(page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::{IncrementalLoader, LoadOutcome};
    use serde::Deserialize;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Project {
        id: u32,
        title: String,
    }

    /// Answers `responses.len()` requests in order with canned bodies and
    /// reports each request line it saw.
    fn serve(responses: Vec<(u16, String)>) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
        let port = listener.local_addr().unwrap().port();
        let (seen_tx, seen_rx) = mpsc::channel();

        thread::spawn(move || {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut buf = [0u8; 2048];
                let n = stream.read(&mut buf).unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let line = request.lines().next().unwrap_or_default().to_string();
                let _ = seen_tx.send(line);

                let reason = if status == 200 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
        });

        (format!("http://127.0.0.1:{}/api/", port), seen_rx)
    }

    #[tokio::test]
    async fn sends_page_and_limit_and_reads_bare_arrays() {
        let (base, seen) = serve(vec![(200, r#"[{"id":1,"title":"Audit"}]"#.to_string())]);
        let source: RestPageSource<Project> =
            RestPageSource::new(ApiClient::new(&base, None, 0).unwrap(), "projects", 10);

        let items = source.fetch(3).await.unwrap();
        assert_eq!(items, vec![Project { id: 1, title: "Audit".into() }]);
        assert_eq!(seen.recv().unwrap(), "GET /api/projects?page=3&limit=10 HTTP/1.1");
    }

    #[tokio::test]
    async fn reads_enveloped_pages() {
        let (base, _seen) = serve(vec![(
            200,
            r#"{"data":[{"id":7,"title":"Survey"}],"total":1}"#.to_string(),
        )]);
        let source: RestPageSource<Project> =
            RestPageSource::new(ApiClient::new(&base, None, 0).unwrap(), "projects", 10);

        let items = source.fetch(1).await.unwrap();
        assert_eq!(items[0].id, 7);
    }

    #[tokio::test]
    async fn error_status_surfaces_as_status_error() {
        let (base, _seen) = serve(vec![(404, "missing".to_string())]);
        let source: RestPageSource<Project> =
            RestPageSource::new(ApiClient::new(&base, None, 0).unwrap(), "projects", 10);

        match source.fetch(1).await {
            Err(RetrieveError::Status { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "missing");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn drives_an_incremental_loader_to_exhaustion() {
        let (base, _seen) = serve(vec![
            (200, r#"[{"id":1,"title":"a"},{"id":2,"title":"b"}]"#.to_string()),
            (200, r#"{"data":[]}"#.to_string()),
        ]);
        let source: RestPageSource<Project> =
            RestPageSource::new(ApiClient::new(&base, None, 0).unwrap(), "projects", 2);
        let loader = IncrementalLoader::new(source);

        assert_eq!(loader.load_more().await, LoadOutcome::Appended(2));
        assert_eq!(loader.load_more().await, LoadOutcome::Exhausted);
        assert!(!loader.has_more());
        assert_eq!(loader.len(), 2);
    }
}
