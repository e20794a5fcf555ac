//! HTTP access to upstream release metadata

use crate::error::{HttpClientSnafu, HttpSnafu, Result};
use async_trait::async_trait;
use snafu::ResultExt;
use tracing::debug;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the body, failing on non-2xx responses
    async fn get_text(&self, url: &str) -> Result<String>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        // api.github.com rejects requests without a user agent
        let client = reqwest::Client::builder()
            .user_agent(concat!("k8s-ci/", env!("CARGO_PKG_VERSION")))
            .build()
            .context(HttpClientSnafu)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get_text(&self, url: &str) -> Result<String> {
        debug!("GET {url}");
        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(HttpSnafu { url })?
            .text()
            .await
            .context(HttpSnafu { url })
    }
}
