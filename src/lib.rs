//! # ojsharvest
//!
//! Open Journal Systems archive harvester - concurrent issue crawl, abstract
//! rendering and metadata normalization.
//!
//! ## Modules
//!
//! - [`schema`] - Declarative selector schema, validated once at startup
//! - [`config`] - Site URLs, record constants and timeouts
//! - [`http`] - Static page fetching
//! - [`discovery`] - Latest issue id from the archive listing
//! - [`issue`] - Raw article extraction from one issue page
//! - [`orchestrator`] - Concurrent fan-out over an issue range
//! - [`normalize`] - Raw articles to normalized records
//! - [`abstracts`] - Abstract retrieval through a headless browser
//! - [`sink`] - CSV and JSON persistence
//! - [`pipeline`] - End-to-end harvest
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ojsharvest::config::HarvestConfig;
//! use ojsharvest::pipeline::{Harvester, RangeRequest};
//! use ojsharvest::schema::SelectorSchema;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let harvester = Harvester::new(HarvestConfig::default(), SelectorSchema::load(None)?)?;
//!     let output = harvester.run(RangeRequest::default()).await?;
//!     println!("Harvested {} articles", output.records.len());
//!     Ok(())
//! }
//! ```

pub mod abstracts;
pub mod config;
pub mod discovery;
pub mod error;
pub mod http;
pub mod issue;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod schema;
pub mod sink;

pub use error::{HarvestError, Result};

/// Issue identifier as used in `issue/view/{id}` URLs
pub type IssueId = u32;

/// Marker for a field that was not found on the page
pub const MISSING_MARKER: &str = "N/A";
