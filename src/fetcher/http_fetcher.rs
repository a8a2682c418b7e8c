use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::app::{Result, SyncError};
use crate::config::HttpConfig;
use crate::fetcher::{FetchRequest, FetchResult, Fetcher};

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_config(&HttpConfig::default())
    }

    pub fn with_config(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        tracing::debug!("GET {}", request.url);

        let mut builder = self.client.get(request.url.clone());
        if let Some(username) = &request.username {
            builder = builder.basic_auth(username, request.password.as_ref());
        }

        let mut response = builder.send().await?;
        let status = response.status();

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                url: request.url.to_string(),
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
        }

        tracing::debug!("{} returned {} bytes", request.url, body.len());

        Ok(FetchResult::new(body, status.as_u16(), content_type))
    }
}
