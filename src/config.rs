//! Harvest configuration.
//!
//! Everything site-specific lives here: page URLs, the constants stamped onto
//! every record, and the timeouts. Values come from a JSON file whose fields
//! are all optional; missing fields fall back to the J-PTIIK defaults.

use crate::error::{HarvestError, Result};
use crate::normalize::RecordStamp;
use crate::IssueId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Placeholder replaced by an issue or article id in URL templates
pub const ID_PLACEHOLDER: &str = "{id}";

/// Default config file: `<config_dir>/ojsharvest/config.json`
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ojsharvest").join("config.json"))
}

/// Runtime configuration for a harvest run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Archive listing page enumerating all issues
    pub archive_url: String,
    /// Issue page URL, `{id}` is the issue id
    pub issue_url_template: String,
    /// Canonical abstract page URL, `{id}` is the article id
    pub abstract_url_template: String,
    pub journal_conference_name: String,
    pub publisher: String,
    pub group_name: String,
    /// Timeout for static page fetches
    pub request_timeout_secs: u64,
    /// Timeout for one rendered-page navigation
    pub navigation_timeout_secs: u64,
    /// Maximum rendering sessions open at once
    pub abstract_concurrency: usize,
    /// Where rendered markup is dumped when the abstract node is missing
    pub diagnostics_dir: PathBuf,
    /// Chrome/Chromium binary; auto-detected when unset
    pub browser_executable: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            archive_url: "https://j-ptiik.ub.ac.id/index.php/j-ptiik/issue/archive".to_string(),
            issue_url_template: "https://j-ptiik.ub.ac.id/index.php/j-ptiik/issue/view/{id}"
                .to_string(),
            abstract_url_template: "https://j-ptiik.ub.ac.id/index.php/j-ptiik/article/view/{id}"
                .to_string(),
            journal_conference_name:
                "Jurnal Pengembangan Teknologi Informasi dan Ilmu Komputer".to_string(),
            publisher: "Fakultas Ilmu Komputer, Universitas Brawijaya".to_string(),
            group_name: "default".to_string(),
            request_timeout_secs: 30,
            navigation_timeout_secs: 30,
            abstract_concurrency: 4,
            diagnostics_dir: PathBuf::from("diagnostics"),
            browser_executable: None,
        }
    }
}

impl HarvestConfig {
    /// Load configuration.
    ///
    /// Uses `path` when given, otherwise the default config file if it
    /// exists, otherwise built-in defaults. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Read a config file without validating it
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, template) in [
            ("issue_url_template", &self.issue_url_template),
            ("abstract_url_template", &self.abstract_url_template),
        ] {
            if !template.contains(ID_PLACEHOLDER) {
                return Err(HarvestError::Config(format!(
                    "{} must contain {}",
                    name, ID_PLACEHOLDER
                )));
            }
        }
        if self.archive_url.trim().is_empty() {
            return Err(HarvestError::Config("archive_url is empty".to_string()));
        }
        if self.request_timeout_secs == 0 || self.navigation_timeout_secs == 0 {
            return Err(HarvestError::Config("timeouts must be positive".to_string()));
        }
        if self.abstract_concurrency == 0 {
            return Err(HarvestError::Config(
                "abstract_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn issue_url(&self, issue_id: IssueId) -> String {
        self.issue_url_template
            .replace(ID_PLACEHOLDER, &issue_id.to_string())
    }

    pub fn abstract_url(&self, article_id: &str) -> String {
        self.abstract_url_template.replace(ID_PLACEHOLDER, article_id)
    }

    /// Constants stamped onto every normalized record
    pub fn stamp(&self) -> RecordStamp {
        RecordStamp {
            journal_conference_name: self.journal_conference_name.clone(),
            publisher: self.publisher.clone(),
            group_name: self.group_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = HarvestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.issue_url(42),
            "https://j-ptiik.ub.ac.id/index.php/j-ptiik/issue/view/42"
        );
        assert!(config.abstract_url("9").ends_with("/article/view/9"));
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let mut temp = NamedTempFile::new()?;
        write!(temp, r#"{{"group_name": "kelompok-3", "abstract_concurrency": 2}}"#)?;

        let config = HarvestConfig::load(Some(temp.path()))?;
        assert_eq!(config.group_name, "kelompok-3");
        assert_eq!(config.abstract_concurrency, 2);
        assert_eq!(config.request_timeout_secs, 30);
        Ok(())
    }

    #[test]
    fn test_rejects_template_without_placeholder() {
        let config = HarvestConfig {
            issue_url_template: "https://example.com/issue".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = HarvestConfig::load(Some(Path::new("/nonexistent/config.json")))
            .err()
            .expect("should fail");
        assert!(matches!(err, HarvestError::Config(_)));
    }
}
