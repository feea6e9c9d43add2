//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest` with exponential
//! backoff retries for transient failures and JSON response handling.

use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest_middleware::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Deserialized body plus the transaction metadata.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The deserialized body of a 2xx response.
    pub data: Option<T>,
    /// The raw body of a non-2xx response.
    pub error_body: Option<String>,
    pub status: u16,
    pub success: bool,
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// Turns a non-2xx response into [`RetrieveError::Status`].
    pub fn into_result(self) -> Result<T, RetrieveError> {
        match self.data {
            Some(data) if self.success => Ok(data),
            _ => Err(RetrieveError::Status {
                status: self.status,
                body: self.error_body.unwrap_or_default(),
            }),
        }
    }
}

/// Base URL, optional bearer token, and retry middleware.
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a client whose transient failures are retried up to
    /// `max_retries` times with exponential backoff.
    ///
    /// # Errors
    /// Returns [`RetrieveError::Url`] if `base_url` is not an absolute URL.
    pub fn new(
        base_url: &str,
        auth_token: Option<String>,
        max_retries: u32,
    ) -> Result<Self, RetrieveError> {
        let url = Url::parse(base_url)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            auth_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Joins `path` onto the base URL and appends `query` pairs.
    pub fn url_for(&self, path: &str, query: &[(&str, String)]) -> Result<Url, RetrieveError> {
        let mut url = self.base_url.join(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Performs a request against an absolute URL.
    ///
    /// Transport failures (after retries) are errors. A non-2xx status is not:
    /// it comes back with `success == false` and the raw body.
    pub async fn request_url<T, B>(
        &self,
        method: Method,
        url: Url,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> Result<ApiResponse<T>, RetrieveError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let mut req = self.inner.request(method, url);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let data = response
                .json::<T>()
                .await
                .map_err(|e| RetrieveError::Decode(e.to_string()))?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            log::debug!("HTTP {} from server: {:?}", status, error_text);
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }

    /// Performs a request against `path`, relative to the base URL.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> Result<ApiResponse<T>, RetrieveError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let url = self.url_for(path, &[])?;
        self.request_url(method, url, headers, body).await
    }
}
