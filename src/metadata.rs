//! Typed views over a document's `meta` context.
//!
//! The document source hands back an untyped, string-keyed context. By the
//! time a context reaches this module it has passed schema validation, so
//! extraction here is a plain serde conversion plus date parsing. The only
//! errors left to report are the ones the schema cannot express.

use crate::source::{Context, RenderResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Taxonomy slug path -> optional series part.
pub type Memberships = BTreeMap<String, Option<u32>>;

#[derive(Error, Debug)]
#[error("{}: {message}", srp.display())]
pub struct MetaError {
    pub srp: PathBuf,
    pub message: String,
}

impl MetaError {
    pub fn new(srp: &Path, message: impl Into<String>) -> Self {
        Self {
            srp: srp.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Accepted date spellings, tried in order after RFC 3339.
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d-%H%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a document date: `2024-03-01`, `2024-03-01-1530`, ISO date-times.
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    if let Some(dt) = DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Membership {
    Flag(bool),
    Part(u32),
}

fn memberships(raw: BTreeMap<String, Membership>) -> Memberships {
    raw.into_iter()
        .map(|(slug, m)| match m {
            Membership::Flag(_) => (slug, None),
            Membership::Part(part) => (slug, Some(part)),
        })
        .collect()
}

/// One photo entry of a gallery document, matched to an image file by `key`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PhotoMeta {
    /// Image path relative to the gallery document's directory.
    pub key: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct GalleryMeta {
    #[serde(default)]
    pub per_page: Option<usize>,
    #[serde(default, rename = "img")]
    pub images: Vec<PhotoMeta>,
}

impl GalleryMeta {
    pub fn photo(&self, key: &str) -> Option<&PhotoMeta> {
        self.images.iter().find(|p| p.key == key)
    }
}

#[derive(Deserialize)]
struct RawContentMeta {
    slug: String,
    #[serde(default)]
    pk: Option<u64>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    lead: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    summary_content: Option<String>,
    #[serde(default)]
    lead_content: Option<String>,
    #[serde(default)]
    use_template: Option<String>,
    #[serde(default)]
    img: Option<String>,
    #[serde(default)]
    disable_comments: bool,
    #[serde(default)]
    taxonomy: BTreeMap<String, Membership>,
    #[serde(default)]
    gallery: Option<GalleryMeta>,
}

/// Metadata of a content document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentMeta {
    pub slug: String,
    pub pk: Option<u64>,
    pub date: Option<NaiveDateTime>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub lead: Option<String>,
    pub summary: Option<String>,
    /// Rendered summary: the `summary` field, or the inline `sum` fragments.
    pub summary_content: Option<String>,
    pub lead_content: Option<String>,
    pub use_template: Option<String>,
    pub img: Option<String>,
    pub disable_comments: bool,
    pub taxonomy: Memberships,
    pub gallery: Option<GalleryMeta>,
}

impl ContentMeta {
    pub fn from_context(srp: &Path, context: &Context) -> Result<Self, MetaError> {
        let raw: RawContentMeta = meta_value(srp, context)?;
        let date = match raw.date.as_deref() {
            Some(s) => Some(
                parse_date(s).ok_or_else(|| MetaError::new(srp, format!("bad date '{s}'")))?,
            ),
            None => None,
        };
        Ok(Self {
            slug: raw.slug,
            pk: raw.pk,
            date,
            title: raw.title,
            description: raw.description,
            lead: raw.lead,
            summary: raw.summary,
            summary_content: raw.summary_content,
            lead_content: raw.lead_content,
            use_template: raw.use_template,
            img: raw.img,
            disable_comments: raw.disable_comments,
            taxonomy: memberships(raw.taxonomy),
            gallery: raw.gallery,
        })
    }

    pub fn from_result(srp: &Path, result: &RenderResult) -> Result<Self, MetaError> {
        Self::from_context(srp, &result.context)
    }

    /// Title, falling back to the slug.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.slug)
    }

    /// Whether the named meta field is present and non-empty.
    pub fn has_field(&self, field: &str) -> bool {
        let text = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        match field {
            "title" => text(&self.title),
            "description" => text(&self.description),
            "lead" => text(&self.lead),
            "summary" => text(&self.summary) || text(&self.summary_content),
            "img" => text(&self.img),
            "date" => self.date.is_some(),
            _ => false,
        }
    }
}

#[derive(Deserialize)]
struct RawTaxonomyMeta {
    slug: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    pseudo: bool,
    #[serde(default)]
    gallery: bool,
    #[serde(default)]
    taxonomy: BTreeMap<String, Membership>,
}

/// Metadata of a taxonomy document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaxonomyMeta {
    pub slug_path: String,
    pub title: String,
    pub description: Option<String>,
    /// Explicit parent. Must agree with the slug path's prefix.
    pub parent: Option<String>,
    pub pseudo: bool,
    pub gallery: bool,
    pub taxonomy: Memberships,
}

impl TaxonomyMeta {
    pub fn from_context(srp: &Path, context: &Context) -> Result<Self, MetaError> {
        let raw: RawTaxonomyMeta = meta_value(srp, context)?;
        Ok(Self {
            slug_path: raw.slug,
            title: raw.title,
            description: raw.description,
            parent: raw.parent,
            pseudo: raw.pseudo,
            gallery: raw.gallery,
            taxonomy: memberships(raw.taxonomy),
        })
    }
}

fn meta_value<T: for<'de> Deserialize<'de>>(srp: &Path, context: &Context) -> Result<T, MetaError> {
    let meta = context
        .get("meta")
        .cloned()
        .ok_or_else(|| MetaError::new(srp, "missing meta table"))?;
    serde_json::from_value(meta).map_err(|e| MetaError::new(srp, e.to_string()))
}
