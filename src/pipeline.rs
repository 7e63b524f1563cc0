//! End-to-end harvest: discovery, issue crawl, normalization, abstracts,
//! aggregation and output.
//!
//! [`Harvester`] owns the HTTP client, configuration and compiled schema.
//! The rendering backend is passed in for the abstract stage only.

use crate::abstracts::{AbstractFetcher, AbstractStats, PageRenderer};
use crate::config::HarvestConfig;
use crate::discovery::latest_issue_id;
use crate::error::{HarvestError, IssueCrawlFailure, Result};
use crate::http::build_http_client;
use crate::issue::{crawl_issue, IssueOutcome};
use crate::normalize::{normalize_issue, ArticleRecord, RecordStamp};
use crate::orchestrator::crawl_range;
use crate::schema::CompiledSchema;
use crate::{sink, IssueId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Requested id range; open ends are filled in by [`Harvester::resolve_range`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeRequest {
    pub from: Option<IssueId>,
    pub to: Option<IssueId>,
}

/// Issue that produced no articles because its crawl failed
#[derive(Debug, Clone, Serialize)]
pub struct FailedIssue {
    pub issue_id: IssueId,
    pub error: String,
}

impl From<&IssueCrawlFailure> for FailedIssue {
    fn from(failure: &IssueCrawlFailure) -> Self {
        Self {
            issue_id: failure.issue_id,
            error: failure.error.to_string(),
        }
    }
}

/// Summary written next to the record files
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub from: IssueId,
    pub to: IssueId,
    pub issues_scheduled: usize,
    pub issues_succeeded: usize,
    pub failed_issues: Vec<FailedIssue>,
    pub records: usize,
    pub abstracts: Option<AbstractStats>,
}

/// Records of a run plus its report
#[derive(Debug)]
pub struct HarvestOutput {
    pub records: Vec<ArticleRecord>,
    pub report: RunReport,
}

/// Flatten per-issue outcomes into records (issue id ascending, document
/// order within an issue) and the list of failures.
pub fn aggregate(
    results: BTreeMap<IssueId, IssueOutcome>,
    stamp: &RecordStamp,
) -> (Vec<ArticleRecord>, Vec<IssueCrawlFailure>) {
    let mut records = Vec::new();
    let mut failures = Vec::new();

    for (issue_id, outcome) in results {
        match outcome {
            Ok(raw) => records.extend(normalize_issue(issue_id, &raw, stamp)),
            Err(failure) => failures.push(failure),
        }
    }
    (records, failures)
}

pub struct Harvester {
    client: reqwest::Client,
    config: HarvestConfig,
    schema: CompiledSchema,
}

impl Harvester {
    pub fn new(config: HarvestConfig, schema: CompiledSchema) -> Result<Self> {
        let client = build_http_client(config.request_timeout_secs)?;
        Ok(Self {
            client,
            config,
            schema,
        })
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Latest issue id on the archive page. Errors are fatal for a run.
    pub async fn discover(&self) -> Result<IssueId> {
        latest_issue_id(&self.client, &self.config.archive_url, &self.schema.archive).await
    }

    /// Fill open ends: `from` defaults to 1, `to` to the discovered latest
    /// issue. Discovery only runs when `to` is open.
    pub async fn resolve_range(&self, request: RangeRequest) -> Result<RangeInclusive<IssueId>> {
        let from = request.from.unwrap_or(1);
        if from == 0 {
            return Err(HarvestError::Config("issue ids start at 1".to_string()));
        }
        let to = match request.to {
            Some(to) => to,
            None => self.discover().await?,
        };
        if from > to {
            warn!(from, to, "Empty issue range");
        }
        Ok(from..=to)
    }

    /// Crawl every issue in `ids` concurrently
    pub async fn crawl(&self, ids: RangeInclusive<IssueId>) -> BTreeMap<IssueId, IssueOutcome> {
        crawl_range(ids, |issue_id| {
            let url = self.config.issue_url(issue_id);
            async move { crawl_issue(&self.client, &url, &self.schema.issue, issue_id).await }
        })
        .await
    }

    /// Discover, crawl and normalize. Abstracts are left empty.
    pub async fn run(&self, request: RangeRequest) -> Result<HarvestOutput> {
        let ids = self.resolve_range(request).await?;
        let (from, to) = (*ids.start(), *ids.end());

        let results = self.crawl(ids).await;
        let issues_scheduled = results.len();
        let (records, failures) = aggregate(results, &self.config.stamp());

        for failure in &failures {
            error!(issue_id = failure.issue_id, error = %failure.error, "Issue skipped");
        }

        let report = RunReport {
            from,
            to,
            issues_scheduled,
            issues_succeeded: issues_scheduled - failures.len(),
            failed_issues: failures.iter().map(FailedIssue::from).collect(),
            records: records.len(),
            abstracts: None,
        };
        info!(
            issues = report.issues_scheduled,
            failed = report.failed_issues.len(),
            records = report.records,
            "Crawl and normalization complete"
        );

        Ok(HarvestOutput { records, report })
    }

    /// Fill abstracts of `output` using `renderer`
    pub async fn fetch_abstracts<R: PageRenderer>(&self, output: &mut HarvestOutput, renderer: &R) {
        let fetcher = AbstractFetcher::new(renderer, &self.schema.abstract_page, &self.config);
        let stats = fetcher.fill_abstracts(&mut output.records).await;
        output.report.abstracts = Some(stats);
    }
}

/// Write `articles.csv`, `articles.json` and `report.json` into `dir`
pub fn write_output(dir: &Path, output: &HarvestOutput) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let csv_path = dir.join("articles.csv");
    let json_path = dir.join("articles.json");
    let report_path = dir.join("report.json");

    sink::write_csv(&csv_path, &output.records)?;
    sink::write_json(&json_path, &output.records)?;
    std::fs::write(&report_path, serde_json::to_string_pretty(&output.report)?)?;
    info!(path = %report_path.display(), "Saved run report");

    Ok(vec![csv_path, json_path, report_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstracts::testing::{Script, ScriptedRenderer};
    use crate::normalize::Year;
    use crate::schema::SelectorSchema;
    use mockito::{Mock, Server, ServerGuard};
    use tempfile::TempDir;

    fn archive_html(base: &str) -> String {
        format!(
            r#"<ul class="issues_archive">
                <li><div class="obj_issue_summary"><h2><a class="title" href="{base}/issue/view/3">Vol 3</a></h2></div></li>
                <li><div class="obj_issue_summary"><h2><a class="title" href="{base}/issue/view/2">Vol 2</a></h2></div></li>
                <li><div class="obj_issue_summary"><h2><a class="title" href="{base}/issue/view/1">Vol 1</a></h2></div></li>
            </ul>"#
        )
    }

    const ISSUE_ONE: &str = r#"<div class="heading"><h2>Articles</h2></div><ul>
        <li class="note-jptiik">
            <h3 class="title"><a href="/article/view/11">Sistem Rekomendasi</a></h3>
            <div class="authors">Ani; Budi</div>
        </li>
        <li class="note-jptiik">
            <h3 class="title"><a href="/article/view/12">Jaringan Syaraf</a></h3>
            <div class="authors">Citra</div>
            <div class="published"><span class="value base">17 Mar 2021</span></div>
        </li>
    </ul>"#;

    const ISSUE_THREE: &str = r#"<ul>
        <li class="note-jptiik">
            <h3 class="title"><a href="/article/view/31">Edge Computing</a></h3>
            <div class="authors">Dewi</div>
            <div class="published"><span class="value base">edition 2019 reprint</span></div>
        </li>
    </ul>"#;

    /// Journal server; the returned mocks stay registered while held.
    async fn journal_server() -> (ServerGuard, Vec<Mock>) {
        let mut server = Server::new_async().await;
        let archive = archive_html(&server.url());
        let mut mocks = Vec::new();
        for (path, status, body) in [
            ("/archive", 200, archive.as_str()),
            ("/issue/view/1", 200, ISSUE_ONE),
            ("/issue/view/2", 500, ""),
            ("/issue/view/3", 200, ISSUE_THREE),
        ] {
            let mock = server
                .mock("GET", path)
                .with_status(status)
                .with_body(body)
                .create_async()
                .await;
            mocks.push(mock);
        }
        (server, mocks)
    }

    fn config(server: &ServerGuard, diagnostics: &Path) -> HarvestConfig {
        HarvestConfig {
            archive_url: format!("{}/archive", server.url()),
            issue_url_template: format!("{}/issue/view/{{id}}", server.url()),
            abstract_url_template: "https://render.example/abstract/{id}".to_string(),
            group_name: "g7".to_string(),
            request_timeout_secs: 5,
            diagnostics_dir: diagnostics.to_path_buf(),
            ..Default::default()
        }
    }

    fn harvester(config: HarvestConfig) -> Harvester {
        let schema = SelectorSchema::default().compile().expect("schema");
        Harvester::new(config, schema).expect("harvester")
    }

    #[tokio::test]
    async fn test_full_run() {
        let (server, _mocks) = journal_server().await;
        let dir = TempDir::new().expect("tempdir");
        let harvester = harvester(config(&server, &dir.path().join("diag")));

        let mut output = harvester.run(RangeRequest::default()).await.expect("run");

        assert_eq!((output.report.from, output.report.to), (1, 3));
        assert_eq!(output.report.issues_scheduled, 3);
        assert_eq!(output.report.issues_succeeded, 2);
        assert_eq!(output.report.failed_issues.len(), 1);
        assert_eq!(output.report.failed_issues[0].issue_id, 2);

        let titles: Vec<(IssueId, &str)> = output
            .records
            .iter()
            .map(|r| (r.issue_id, r.title.as_str()))
            .collect();
        assert_eq!(
            titles,
            vec![
                (1, "Sistem Rekomendasi"),
                (1, "Jaringan Syaraf"),
                (3, "Edge Computing")
            ]
        );
        // first article inherits the issue's common date
        assert_eq!(output.records[0].year, Year::Known(2021));
        assert_eq!(output.records[2].year, Year::Known(2019));
        assert_eq!(output.records[0].authors, vec!["Ani", "Budi"]);
        assert_eq!(output.records[0].group_name, "g7");

        let renderer = ScriptedRenderer::default()
            .with(
                "https://render.example/abstract/11",
                Script::Html(
                    r#"<section class="item abstract">Abstrak sebelas.</section>"#.to_string(),
                ),
            )
            .with("https://render.example/abstract/12", Script::Fail);
        harvester.fetch_abstracts(&mut output, &renderer).await;

        assert_eq!(output.records[0].abstract_text, "Abstrak sebelas.");
        assert_eq!(output.records[1].abstract_text, "");
        assert_eq!(output.records[2].abstract_text, "");
        assert!(dir.path().join("diag").join("abstract_31.html").exists());
        assert_eq!(renderer.opened(), renderer.closed());

        let out_dir = dir.path().join("out");
        write_output(&out_dir, &output).expect("write output");
        let from_csv = sink::read_csv(&out_dir.join("articles.csv")).expect("read csv");
        let from_json = sink::read_json(&out_dir.join("articles.json")).expect("read json");
        assert_eq!(from_csv, output.records);
        assert_eq!(from_json, output.records);

        let report: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(out_dir.join("report.json")).expect("report"),
        )
        .expect("report json");
        assert_eq!(report["failed_issues"][0]["issue_id"], 2);
        assert_eq!(report["abstracts"]["found"], 1);
    }

    #[tokio::test]
    async fn test_explicit_range_skips_discovery() {
        let (server, _mocks) = journal_server().await;
        let dir = TempDir::new().expect("tempdir");
        let mut config = config(&server, dir.path());
        config.archive_url = format!("{}/no-archive", server.url());
        let harvester = harvester(config);

        let output = harvester
            .run(RangeRequest {
                from: Some(3),
                to: Some(3),
            })
            .await
            .expect("run");
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].issue_id, 3);
    }

    #[tokio::test]
    async fn test_discovery_failure_aborts() {
        let (server, _mocks) = journal_server().await;
        let dir = TempDir::new().expect("tempdir");
        let mut config = config(&server, dir.path());
        config.archive_url = format!("{}/no-archive", server.url());
        let harvester = harvester(config);

        let result = harvester.run(RangeRequest::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_all_issues_failing_still_produces_output() {
        let (server, _mocks) = journal_server().await;
        let dir = TempDir::new().expect("tempdir");
        let harvester = harvester(config(&server, dir.path()));

        let output = harvester
            .run(RangeRequest {
                from: Some(2),
                to: Some(2),
            })
            .await
            .expect("run");
        assert!(output.records.is_empty());

        let out_dir = dir.path().join("out");
        let written = write_output(&out_dir, &output).expect("write output");
        assert_eq!(written.len(), 3);
        assert!(sink::read_csv(&out_dir.join("articles.csv"))
            .expect("read csv")
            .is_empty());
    }

    #[tokio::test]
    async fn test_zero_from_is_rejected() {
        let (server, _mocks) = journal_server().await;
        let dir = TempDir::new().expect("tempdir");
        let harvester = harvester(config(&server, dir.path()));
        let result = harvester
            .resolve_range(RangeRequest {
                from: Some(0),
                to: Some(4),
            })
            .await;
        assert!(matches!(result, Err(HarvestError::Config(_))));
    }
}
