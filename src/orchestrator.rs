//! Concurrent fan-out over an issue id range.
//!
//! Every id is scheduled at once and the batch is joined only when all
//! crawls have settled. Each future carries its own id, so results are keyed
//! by the id that produced them whatever the completion order.

use crate::issue::IssueOutcome;
use crate::IssueId;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::ops::RangeInclusive;
use tracing::info;

/// Crawl every id in `ids` concurrently and collect one outcome per id.
///
/// No backpressure: the whole range is in flight together.
pub async fn crawl_range<F, Fut>(
    ids: RangeInclusive<IssueId>,
    crawl: F,
) -> BTreeMap<IssueId, IssueOutcome>
where
    F: Fn(IssueId) -> Fut,
    Fut: Future<Output = IssueOutcome>,
{
    info!(from = *ids.start(), to = *ids.end(), "Scheduling issue crawls");

    let tasks = ids.map(|issue_id| {
        let task = crawl(issue_id);
        async move { (issue_id, task.await) }
    });

    let results: BTreeMap<IssueId, IssueOutcome> = join_all(tasks).await.into_iter().collect();

    let failed = results.values().filter(|r| r.is_err()).count();
    info!(
        total = results.len(),
        succeeded = results.len() - failed,
        failed,
        "Issue batch settled"
    );
    results
}
