//! Static page fetching.
//!
//! Archive and issue pages are server-rendered, so a plain HTTP GET is
//! enough for them. Article pages go through [`crate::abstracts`] instead.

use crate::error::{HarvestError, Result};
use std::time::Duration;
use tracing::debug;

/// User agent string for requests
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Build the HTTP client shared by discovery and all issue crawls
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .cookie_store(true)
        .build()
        .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Fetch a page body, mapping HTTP failures onto [`HarvestError`]
pub async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String> {
    debug!(url, "Fetching page");

    let response = client
        .get(url)
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .header("Cache-Control", "no-cache")
        .header("Pragma", "no-cache")
        .send()
        .await?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(HarvestError::RateLimited(60));
    }

    if !status.is_success() {
        return Err(HarvestError::Api {
            code: status.as_u16() as i32,
            message: format!("HTTP error: {}", status),
        });
    }

    Ok(response.text().await?)
}
