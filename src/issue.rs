//! Single-issue crawling.
//!
//! [`crawl_issue`] is a pure function of the issue id apart from the network
//! read. It never returns an error across its boundary: every failure is
//! folded into the [`IssueOutcome`] value.

use crate::error::{IssueCrawlFailure, Result};
use crate::http::fetch_page;
use crate::schema::{CompiledPage, ExtractedItem};
use crate::{IssueId, MISSING_MARKER};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

/// Article fields as extracted from an issue page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawArticle {
    pub title: String,
    /// Semicolon-delimited author list
    pub authors: String,
    /// Free-text publication date
    pub published: String,
    /// Absolute detail link, or empty
    pub link: String,
}

impl RawArticle {
    /// Build from an extracted item. Missing or blank text fields become the
    /// missing-marker; relative links are resolved against `base`.
    pub fn from_item(item: &ExtractedItem, base: Option<&Url>) -> Self {
        let text = |name: &str| {
            item.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or(MISSING_MARKER)
                .to_string()
        };

        let link = item
            .get("link")
            .map(|href| href.trim())
            .filter(|href| !href.is_empty())
            .map(|href| match base.and_then(|b| b.join(href).ok()) {
                Some(resolved) => resolved.to_string(),
                None => href.to_string(),
            })
            .unwrap_or_default();

        Self {
            title: text("title"),
            authors: text("authors"),
            published: text("published"),
            link,
        }
    }
}

/// Result of crawling one issue
pub type IssueOutcome = std::result::Result<Vec<RawArticle>, IssueCrawlFailure>;

/// Extract the raw article list from an issue page, in document order
pub fn parse_issue_page(html: &str, page: &CompiledPage, base: Option<&Url>) -> Vec<RawArticle> {
    page.extract_html(html)
        .iter()
        .map(|item| RawArticle::from_item(item, base))
        .collect()
}

/// Fetch and extract a single issue.
pub async fn crawl_issue(
    client: &reqwest::Client,
    issue_url: &str,
    page: &CompiledPage,
    issue_id: IssueId,
) -> IssueOutcome {
    match fetch_issue(client, issue_url, page).await {
        Ok(articles) => {
            info!(issue_id, count = articles.len(), "Crawled issue");
            Ok(articles)
        }
        Err(error) => {
            warn!(issue_id, url = issue_url, error = %error, "Issue crawl failed");
            Err(IssueCrawlFailure { issue_id, error })
        }
    }
}

async fn fetch_issue(
    client: &reqwest::Client,
    issue_url: &str,
    page: &CompiledPage,
) -> Result<Vec<RawArticle>> {
    let html = fetch_page(client, issue_url).await?;
    let base = Url::parse(issue_url).ok();
    let articles = parse_issue_page(&html, page, base.as_ref());
    debug!(url = issue_url, count = articles.len(), "Parsed issue page");
    Ok(articles)
}
