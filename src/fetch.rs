use std::time::Duration;

use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};

use crate::config;
use crate::error::CrawlError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP fetch layer: given a URL, returns the body or a fetch error.
/// Browser-identifying headers and the timeout live here; the crawl loop
/// only ever sees the binary outcome.
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(config::USER_AGENT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(config::ACCEPT_LANGUAGE),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    pub async fn get(&self, url: &str) -> Result<String, CrawlError> {
        let wrap = |source| CrawlError::Fetch {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(wrap)?;
        let response = response.error_for_status().map_err(wrap)?;
        response.text().await.map_err(wrap)
    }
}

/// Randomized politeness delay between consecutive network requests.
/// A zero upper bound disables it entirely.
#[derive(Debug, Clone, Copy)]
pub struct DelayPolicy {
    min_ms: u64,
    max_ms: u64,
}

impl DelayPolicy {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub async fn pause(&self) {
        if self.max_ms == 0 {
            return;
        }
        let ms = fastrand::u64(self.min_ms..=self.max_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new(2_000, 5_000)
    }
}
