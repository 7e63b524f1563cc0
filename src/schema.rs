//! Declarative selector schema for the three page shapes.
//!
//! Each page shape maps field names to a CSS selector and an extraction kind
//! (element text or an attribute). The schema is plain configuration: it is
//! deserialized from JSON (or taken from [`SelectorSchema::default`]),
//! validated once, and compiled into [`CompiledSchema`] before any page is
//! fetched.

use crate::error::{HarvestError, Result};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Fields the archive page shape must provide.
pub const ARCHIVE_FIELDS: &[&str] = &["issue_link"];

/// Fields the issue page shape must provide.
pub const ISSUE_FIELDS: &[&str] = &["title", "authors", "published", "link"];

/// Fields the abstract page shape must provide.
pub const ABSTRACT_FIELDS: &[&str] = &["abstract"];

/// One extracted item: field name to raw value. Fields whose node was not
/// found are absent.
pub type ExtractedItem = BTreeMap<String, String>;

/// How a field value is read from its node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    /// Whitespace-normalized text content
    Text,
    /// Value of the named attribute
    Attribute { attribute: String },
}

/// Extraction rule for a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Selector relative to the base element; `None` reads the base element itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Descendants matching this selector are left out of text values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldSpec {
    fn text(name: &str, selector: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: Some(selector.to_string()),
            exclude: None,
            kind: FieldKind::Text,
        }
    }

    fn attribute(name: &str, selector: &str, attribute: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: Some(selector.to_string()),
            exclude: None,
            kind: FieldKind::Attribute {
                attribute: attribute.to_string(),
            },
        }
    }
}

/// Extraction rules for one page shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSchema {
    pub name: String,
    /// Every element matching this selector yields one item
    pub base_selector: String,
    pub fields: Vec<FieldSpec>,
}

/// Selector schema for every page shape the harvester reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSchema {
    pub archive: PageSchema,
    pub issue: PageSchema,
    pub abstract_page: PageSchema,
}

impl Default for SelectorSchema {
    fn default() -> Self {
        Self {
            archive: PageSchema {
                name: "Issue Archive".to_string(),
                base_selector: "ul.issues_archive li div.obj_issue_summary".to_string(),
                fields: vec![FieldSpec::attribute("issue_link", "h2 a.title", "href")],
            },
            issue: PageSchema {
                name: "Issue Articles".to_string(),
                // div.heading matches section headings too; those items are
                // dropped later by the artifact filter.
                base_selector: "li.note-jptiik, div.heading".to_string(),
                fields: vec![
                    FieldSpec::text("title", "h3.title a"),
                    FieldSpec::text("authors", "div.authors"),
                    FieldSpec::text("published", "div.published span.value.base"),
                    FieldSpec::attribute("link", "h3.title a", "href"),
                ],
            },
            abstract_page: PageSchema {
                name: "Article Abstract".to_string(),
                base_selector: "section.item.abstract, div.item.abstract".to_string(),
                fields: vec![FieldSpec {
                    name: "abstract".to_string(),
                    selector: None,
                    // OJS renders the section heading as h2.label
                    exclude: Some(".label".to_string()),
                    kind: FieldKind::Text,
                }],
            },
        }
    }
}

impl SelectorSchema {
    /// Read a schema from a JSON file. The result is not validated yet.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let schema = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Read selector schema");
        Ok(schema)
    }

    /// Load the schema from `path`, or the built-in default, and compile it.
    pub fn load(path: Option<&Path>) -> Result<CompiledSchema> {
        let schema = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        let compiled = schema.compile()?;
        info!(
            source = %path.map(|p| p.display().to_string()).unwrap_or_else(|| "built-in".to_string()),
            "Selector schema validated"
        );
        Ok(compiled)
    }

    /// Validate every page shape and compile all selectors.
    pub fn compile(&self) -> Result<CompiledSchema> {
        Ok(CompiledSchema {
            archive: self.archive.compile(ARCHIVE_FIELDS)?,
            issue: self.issue.compile(ISSUE_FIELDS)?,
            abstract_page: self.abstract_page.compile(ABSTRACT_FIELDS)?,
        })
    }
}

impl PageSchema {
    fn compile(&self, required: &[&str]) -> Result<CompiledPage> {
        let base = parse_selector(&self.name, &self.base_selector)?;

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(HarvestError::Schema(format!(
                    "{}: field with empty name",
                    self.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(HarvestError::Schema(format!(
                    "{}: duplicate field '{}'",
                    self.name, field.name
                )));
            }
            if let FieldKind::Attribute { attribute } = &field.kind {
                if attribute.trim().is_empty() {
                    return Err(HarvestError::Schema(format!(
                        "{}: attribute field '{}' names no attribute",
                        self.name, field.name
                    )));
                }
            }
            let selector = field
                .selector
                .as_deref()
                .map(|s| parse_selector(&self.name, s))
                .transpose()?;
            let exclude = field
                .exclude
                .as_deref()
                .map(|s| parse_selector(&self.name, s))
                .transpose()?;
            fields.push(CompiledField {
                name: field.name.clone(),
                selector,
                exclude,
                kind: field.kind.clone(),
            });
        }

        if let Some(missing) = required.iter().find(|r| !seen.contains(**r)) {
            return Err(HarvestError::Schema(format!(
                "{}: required field '{}' is not defined",
                self.name, missing
            )));
        }

        Ok(CompiledPage {
            name: self.name.clone(),
            base,
            fields,
        })
    }
}

fn parse_selector(page: &str, selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| {
        HarvestError::Schema(format!("{}: invalid selector '{}': {}", page, selector, e))
    })
}

struct CompiledField {
    name: String,
    selector: Option<Selector>,
    exclude: Option<Selector>,
    kind: FieldKind,
}

/// A validated page shape, ready to extract from parsed documents
pub struct CompiledPage {
    name: String,
    base: Selector,
    fields: Vec<CompiledField>,
}

impl CompiledPage {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extract one item per base element, in document order.
    pub fn extract(&self, document: &Html) -> Vec<ExtractedItem> {
        document
            .select(&self.base)
            .map(|element| self.extract_element(element))
            .collect()
    }

    /// Parse `html` and extract from it.
    pub fn extract_html(&self, html: &str) -> Vec<ExtractedItem> {
        self.extract(&Html::parse_document(html))
    }

    fn extract_element(&self, element: ElementRef<'_>) -> ExtractedItem {
        let mut item = ExtractedItem::new();
        for field in &self.fields {
            let node = match &field.selector {
                Some(selector) => element.select(selector).next(),
                None => Some(element),
            };
            let Some(node) = node else {
                continue;
            };
            let value = match &field.kind {
                FieldKind::Text => Some(element_text(node, field.exclude.as_ref())),
                FieldKind::Attribute { attribute } => {
                    node.value().attr(attribute).map(|v| v.trim().to_string())
                }
            };
            if let Some(value) = value {
                item.insert(field.name.clone(), value);
            }
        }
        item
    }
}

/// Compiled selector schema shared by all pipeline stages
pub struct CompiledSchema {
    pub archive: CompiledPage,
    pub issue: CompiledPage,
    pub abstract_page: CompiledPage,
}

/// Text content of an element with runs of whitespace collapsed. Subtrees
/// matching `exclude` are skipped.
pub fn element_text(element: ElementRef<'_>, exclude: Option<&Selector>) -> String {
    let mut words = Vec::new();
    collect_words(element, exclude, &mut words);
    words.join(" ")
}

fn collect_words<'a>(
    element: ElementRef<'a>,
    exclude: Option<&Selector>,
    words: &mut Vec<&'a str>,
) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            words.extend(text.split_whitespace());
        } else if let Some(child) = ElementRef::wrap(child) {
            if exclude.is_some_and(|selector| selector.matches(&child)) {
                continue;
            }
            collect_words(child, exclude, words);
        }
    }
}
