//! Record persistence.
//!
//! The same record set is written twice: `articles.csv` (flat, authors joined
//! with `"; "`) and `articles.json` (nested, authors as arrays). Both read
//! back into identical [`ArticleRecord`]s.

use crate::error::{HarvestError, Result};
use crate::normalize::{split_authors, ArticleRecord, Year};
use crate::IssueId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// CSV column order
pub const CSV_COLUMNS: &[&str] = &[
    "issue_id",
    "title",
    "abstract",
    "authors",
    "journal_conference_name",
    "publisher",
    "year",
    "doi",
    "group_name",
];

/// Separator between authors in the flat form
const AUTHOR_SEPARATOR: &str = "; ";

/// Flat row of the CSV sink
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    issue_id: IssueId,
    title: String,
    #[serde(rename = "abstract")]
    abstract_text: String,
    authors: String,
    journal_conference_name: String,
    publisher: String,
    year: String,
    doi: String,
    group_name: String,
}

impl From<&ArticleRecord> for CsvRow {
    fn from(record: &ArticleRecord) -> Self {
        Self {
            issue_id: record.issue_id,
            title: record.title.clone(),
            abstract_text: record.abstract_text.clone(),
            authors: record.authors.join(AUTHOR_SEPARATOR),
            journal_conference_name: record.journal_conference_name.clone(),
            publisher: record.publisher.clone(),
            year: record.year.to_string(),
            doi: record.doi.clone(),
            group_name: record.group_name.clone(),
        }
    }
}

impl TryFrom<CsvRow> for ArticleRecord {
    type Error = HarvestError;

    fn try_from(row: CsvRow) -> Result<Self> {
        Ok(Self {
            issue_id: row.issue_id,
            title: row.title,
            abstract_text: row.abstract_text,
            authors: split_authors(&row.authors),
            journal_conference_name: row.journal_conference_name,
            publisher: row.publisher,
            year: row.year.parse::<Year>()?,
            doi: row.doi,
            group_name: row.group_name,
        })
    }
}

/// Write records as CSV. The header row is written even for no records.
pub fn write_csv(path: &Path, records: &[ArticleRecord]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    wtr.write_record(CSV_COLUMNS)?;
    for record in records {
        wtr.serialize(CsvRow::from(record))?;
    }
    wtr.flush()?;

    info!(path = %path.display(), count = records.len(), "Saved CSV");
    Ok(())
}

pub fn read_csv(path: &Path) -> Result<Vec<ArticleRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    rdr.deserialize::<CsvRow>()
        .map(|row| ArticleRecord::try_from(row?))
        .collect()
}

/// Write records as a pretty-printed JSON array
pub fn write_json(path: &Path, records: &[ArticleRecord]) -> Result<()> {
    let content = serde_json::to_string_pretty(records)?;
    std::fs::write(path, content)?;
    info!(path = %path.display(), count = records.len(), "Saved JSON");
    Ok(())
}

pub fn read_json(path: &Path) -> Result<Vec<ArticleRecord>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn records() -> Vec<ArticleRecord> {
        vec![
            ArticleRecord {
                issue_id: 3,
                title: "Analisis Sentimen, \"Twitter\"".to_string(),
                abstract_text: "Line one.\nLine two, with comma.".to_string(),
                authors: vec!["Ani Wijaya".to_string(), "Budi Santoso".to_string()],
                journal_conference_name: "J-PTIIK".to_string(),
                publisher: "FILKOM UB".to_string(),
                year: Year::Known(2021),
                doi: "https://j.example/article/view/9".to_string(),
                group_name: "g1".to_string(),
            },
            ArticleRecord {
                issue_id: 4,
                title: "N/A".to_string(),
                abstract_text: String::new(),
                authors: vec!["N/A".to_string()],
                journal_conference_name: "J-PTIIK".to_string(),
                publisher: "FILKOM UB".to_string(),
                year: Year::Unknown,
                doi: String::new(),
                group_name: "g1".to_string(),
            },
        ]
    }

    #[test]
    fn test_csv_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("articles.csv");
        write_csv(&path, &records())?;
        assert_eq!(read_csv(&path)?, records());
        Ok(())
    }

    #[test]
    fn test_json_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("articles.json");
        write_json(&path, &records())?;
        assert_eq!(read_json(&path)?, records());
        Ok(())
    }

    #[test]
    fn test_empty_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let csv_path = dir.path().join("articles.csv");
        let json_path = dir.path().join("articles.json");
        write_csv(&csv_path, &[])?;
        write_json(&json_path, &[])?;

        assert!(read_csv(&csv_path)?.is_empty());
        assert!(read_json(&json_path)?.is_empty());
        let header = std::fs::read_to_string(&csv_path)?;
        assert_eq!(header.trim_end(), CSV_COLUMNS.join(","));
        Ok(())
    }

    #[test]
    fn test_json_field_names() -> Result<()> {
        let value = serde_json::to_value(&records()[1])?;
        let mut keys: Vec<&str> = value
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default();
        keys.sort_unstable();
        let mut expected = CSV_COLUMNS.to_vec();
        expected.sort_unstable();
        assert_eq!(keys, expected);
        assert_eq!(value["year"], "unknown");
        Ok(())
    }
}
