//! Issue discovery from the archive listing.
//!
//! The archive page links every published issue as `.../issue/view/{id}`.
//! The largest id found is the upper bound of the crawl range. Failing to
//! fetch or read the archive leaves the range undefined, so errors here are
//! returned to the caller and end the run.

use crate::error::Result;
use crate::http::fetch_page;
use crate::schema::CompiledPage;
use crate::IssueId;
use tracing::{debug, info};

/// Path fragment identifying issue links
const ISSUE_PATH: &str = "issue/view/";

/// Fetch the archive page and return the latest issue id (0 if none).
pub async fn latest_issue_id(
    client: &reqwest::Client,
    archive_url: &str,
    page: &CompiledPage,
) -> Result<IssueId> {
    info!(url = archive_url, "Discovering latest issue");
    let html = fetch_page(client, archive_url).await?;
    let latest = parse_latest_issue_id(&html, page);
    info!(latest, "Latest issue discovered");
    Ok(latest)
}

/// Highest issue id linked from an archive page, or 0 when none parse.
pub fn parse_latest_issue_id(html: &str, page: &CompiledPage) -> IssueId {
    let ids: Vec<IssueId> = page
        .extract_html(html)
        .iter()
        .filter_map(|item| item.get("issue_link"))
        .filter_map(|link| issue_id_from_link(link))
        .collect();

    debug!(count = ids.len(), ids = ?ids, "Issue ids on archive page");
    ids.into_iter().max().unwrap_or(0)
}

/// Trailing numeric segment of an `issue/view/{id}` link
pub fn issue_id_from_link(link: &str) -> Option<IssueId> {
    if !link.contains(ISSUE_PATH) {
        return None;
    }
    let path = link.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}
