//! Remote document access.
//!
//! A 404 is not an error here: it is the archive's way of saying a candidate
//! has not been published (yet), which the freshness-seeking retry treats as
//! a recoverable miss.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use skycast_core::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Download {
    Found(Vec<u8>),
    Missing,
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn get(&self, url: &str) -> Result<Download, FetchError>;
}

/// Plain HTTP GET over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("skycast/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn get(&self, url: &str) -> Result<Download, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url, "upstream document not published");
            return Ok(Download::Missing);
        }
        if !status.is_success() {
            return Err(FetchError::Upstream {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(url, e))?;
        Ok(Download::Found(body.to_vec()))
    }
}
