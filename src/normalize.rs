//! Metadata normalization.
//!
//! Turns one issue's raw article list into [`ArticleRecord`]s:
//!
//! 1. the first dated article of the issue provides the common date
//! 2. heading artifacts (no title and no authors) are dropped
//! 3. years resolve through an ordered chain: strict `day mon year` parse,
//!    first bare four-digit run, then [`Year::Unknown`]
//! 4. authors split on `;`
//!
//! The abstract starts empty and is filled by [`crate::abstracts`].

use crate::error::HarvestError;
use crate::issue::RawArticle;
use crate::{IssueId, MISSING_MARKER};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Serialized form of [`Year::Unknown`]
pub const UNKNOWN_YEAR: &str = "unknown";

/// Strict publication date format, e.g. `17 Mar 2021`
const STRICT_DATE_FORMAT: &str = "%d %b %Y";

static BARE_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[0-9]{4}\b").expect("bare year regex is valid"));

/// Publication year of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Year {
    Known(i32),
    Unknown,
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Year::Known(year) => write!(f, "{}", year),
            Year::Unknown => f.write_str(UNKNOWN_YEAR),
        }
    }
}

impl FromStr for Year {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == UNKNOWN_YEAR {
            return Ok(Year::Unknown);
        }
        s.parse()
            .map(Year::Known)
            .map_err(|_| HarvestError::Parse(format!("invalid year '{}'", s)))
    }
}

impl Serialize for Year {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Year::Known(year) => serializer.serialize_i32(*year),
            Year::Unknown => serializer.serialize_str(UNKNOWN_YEAR),
        }
    }
}

impl<'de> Deserialize<'de> for Year {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum YearRepr {
            Number(i32),
            Text(String),
        }

        match YearRepr::deserialize(deserializer)? {
            YearRepr::Number(year) => Ok(Year::Known(year)),
            YearRepr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Constants stamped onto every record of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordStamp {
    pub journal_conference_name: String,
    pub publisher: String,
    pub group_name: String,
}

/// Normalized article record, as persisted by the sinks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub issue_id: IssueId,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Never empty; `["N/A"]` when no authors were extracted
    pub authors: Vec<String>,
    pub journal_conference_name: String,
    pub publisher: String,
    pub year: Year,
    /// Raw detail link of the article
    pub doi: String,
    pub group_name: String,
}

/// Empty, blank or the missing-field marker
pub fn is_missing(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == MISSING_MARKER
}

/// First non-missing publication date of an issue, in document order
pub fn common_published(raw: &[RawArticle]) -> Option<&str> {
    raw.iter()
        .map(|article| article.published.as_str())
        .find(|published| !is_missing(published))
}

/// Heading nodes matched by the issue selector carry neither title nor authors
pub fn is_artifact(article: &RawArticle) -> bool {
    is_missing(&article.title) && is_missing(&article.authors)
}

fn strict_year(published: &str) -> Option<i32> {
    NaiveDate::parse_from_str(published.trim(), STRICT_DATE_FORMAT)
        .ok()
        .map(|date| date.year())
}

fn bare_year(published: &str) -> Option<i32> {
    BARE_YEAR
        .find_iter(published)
        .find_map(|m| m.as_str().parse().ok())
}

/// Resolve a publication string to a year, first successful attempt wins
pub fn resolve_year(published: &str) -> Year {
    strict_year(published)
        .or_else(|| bare_year(published))
        .map(Year::Known)
        .unwrap_or(Year::Unknown)
}

/// Split a raw author string on `;`.
///
/// Blank input, the missing-marker, or input without any non-empty piece
/// yields `["N/A"]`.
pub fn split_authors(raw: &str) -> Vec<String> {
    if is_missing(raw) {
        return vec![MISSING_MARKER.to_string()];
    }
    let authors: Vec<String> = raw
        .split(';')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect();
    if authors.is_empty() {
        vec![MISSING_MARKER.to_string()]
    } else {
        authors
    }
}

/// Normalize one issue's raw articles, preserving document order.
pub fn normalize_issue(
    issue_id: IssueId,
    raw: &[RawArticle],
    stamp: &RecordStamp,
) -> Vec<ArticleRecord> {
    let common = common_published(raw);

    let records: Vec<ArticleRecord> = raw
        .iter()
        .filter(|article| !is_artifact(article))
        .map(|article| {
            let published: &str = if is_missing(&article.published) {
                common.unwrap_or(article.published.as_str())
            } else {
                article.published.as_str()
            };
            ArticleRecord {
                issue_id,
                title: article.title.trim().to_string(),
                abstract_text: String::new(),
                authors: split_authors(&article.authors),
                journal_conference_name: stamp.journal_conference_name.clone(),
                publisher: stamp.publisher.clone(),
                year: resolve_year(published),
                doi: article.link.clone(),
                group_name: stamp.group_name.clone(),
            }
        })
        .collect();

    debug!(
        issue_id,
        raw = raw.len(),
        kept = records.len(),
        common_published = ?common,
        "Normalized issue"
    );
    records
}
