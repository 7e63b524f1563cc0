//! Custom error types for ojsharvest.
//!
//! All library functions return `Result<T, HarvestError>` instead of using `unwrap()`.
//! Per-issue crawl failures are wrapped in [`IssueCrawlFailure`] so the
//! orchestrator can keep them as values next to successful issues.

use crate::IssueId;
use thiserror::Error;

/// Main error type for ojsharvest operations.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Headless browser error (chromiumoxide)
    #[error("Browser error: {0}")]
    Browser(String),

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTML or value parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by the journal server
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// Server answered with a non-success status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Status description
        message: String,
    },

    /// Operation exceeded its time budget
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV serialization/deserialization error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Selector schema rejected during validation
    #[error("Schema error: {0}")]
    Schema(String),
}

/// Result type alias using `HarvestError`
pub type Result<T> = std::result::Result<T, HarvestError>;

/// A single issue that could not be crawled.
///
/// The run continues without it; failures are reported at the end.
#[derive(Debug, Error)]
#[error("issue {issue_id} failed: {error}")]
pub struct IssueCrawlFailure {
    pub issue_id: IssueId,
    #[source]
    pub error: HarvestError,
}

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| HarvestError::Parse(msg.to_string()))
    }
}
