//! The one place that talks HTTP. Everything that needs remote data takes an [`HttpFetch`], tests
//! hand in a mock or point [`ReqwestFetch`] at a local server.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mockall::automock;
use reqwest::{header::USER_AGENT, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::env::ENV_CONFIG;

const USER_AGENT_VALUE: &str = concat!("defi-metrics/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{url} returned errors: {messages}")]
    Api { url: String, messages: String },
}

#[automock]
#[async_trait]
pub trait HttpFetch {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<Bytes, FetchError>;
}

pub fn decode_json<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice::<T>(body).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        source,
    })
}

pub async fn fetch_json<T, F>(fetcher: &F, url: &str) -> Result<T, FetchError>
where
    T: DeserializeOwned,
    F: HttpFetch + Sync + ?Sized,
{
    let body = fetcher.fetch(url).await?;
    decode_json(url, &body)
}

/// Requests are sent one at a time, each followed by a fixed pause to stay well within public
/// API rate limits.
pub struct ReqwestFetch {
    client: reqwest::Client,
    request_delay: Duration,
}

impl ReqwestFetch {
    pub fn new(request_delay: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            request_delay,
        }
    }

    pub fn new_from_env() -> Self {
        Self::new(Duration::from_millis(ENV_CONFIG.request_delay_ms))
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Bytes, FetchError> {
        debug!("sending request to {}", url);

        let transport_error = |source: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let response = request
            .header(USER_AGENT, USER_AGENT_VALUE)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.bytes().await.map_err(transport_error)
    }

    async fn send_then_pause(
        &self,
        url: &str,
        request: RequestBuilder,
    ) -> Result<Bytes, FetchError> {
        let result = self.send(url, request).await;
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
        result
    }
}

impl Default for ReqwestFetch {
    fn default() -> Self {
        Self::new_from_env()
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.send_then_pause(url, self.client.get(url)).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<Bytes, FetchError> {
        self.send_then_pause(url, self.client.post(url).json(body))
            .await
    }
}
