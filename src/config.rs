//! Site and subsite configuration.
//!
//! A site is configured by an optional `config.toml` at the site root. Any
//! directory under `content/` may carry its own `config.toml`, which turns
//! that directory into a *subsite*: a nested site with its own home page,
//! slug and listing size, hung below an existing document.
//!
//! ```text
//! site/
//! ├── config.toml              # Site config (overrides stock defaults)
//! └── content/
//!     ├── about.md
//!     └── notes/
//!         ├── config.toml      # Subsite config
//!         └── first.md
//! ```
//!
//! ## Site options
//!
//! ```toml
//! title = "Untitled"
//! description = ""
//! base_url = "http://localhost"   # used for absolute links in RSS and sitemap
//! per_page = 25                   # listing page size
//! date_archive_url = "archive"    # omit to skip date archives
//! pk_in_url = true                # "42-my-post" instead of "my-post"
//! rss_items = 20
//!
//! [required_fields]
//! "types/articles" = ["title", "description"]
//!
//! [images]
//! default_size = [1200, 1200]     # inline images without an explicit size
//! gallery_size = [1600, 1600]
//! thumbnail_size = [400, 400]
//!
//! [processing]
//! max_processes = 4
//! ```
//!
//! ## Subsite options
//!
//! ```toml
//! parent_slug = "about"           # document the subsite hangs below
//! subsite_slug = "notes"
//! template_path_prefix = "notes"  # optional
//! title = "Notes"                 # optional, inherits the site title
//! per_page = 10                   # optional, inherits the site per_page
//! ```
//!
//! Stock defaults are merged under the user's site file key by key, so a
//! site config only names the values it changes. Unknown keys are rejected
//! to catch typos early.

use crate::slug::{is_valid_slug, is_valid_slug_path};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the configuration file at the site root and in subsite directories.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Meta fields that `required_fields` may name.
const REQUIRABLE_FIELDS: &[&str] = &["title", "description", "lead", "summary", "date", "img"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml` at the site root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub title: String,
    pub description: String,
    /// Scheme and host prepended to urls in RSS and the sitemap.
    pub base_url: String,
    /// Items per listing page (home, taxonomy, archives).
    pub per_page: usize,
    /// Slug of the date archive root. No archive pages when absent.
    pub date_archive_url: Option<String>,
    /// Prefix the last url segment of PK documents with their PK.
    pub pk_in_url: bool,
    /// Number of entries in `index.xml`.
    pub rss_items: usize,
    /// Taxonomy slug path -> meta fields required on content classified under it.
    pub required_fields: BTreeMap<String, Vec<String>>,
    pub images: ImagesConfig,
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            description: String::new(),
            base_url: "http://localhost".to_string(),
            per_page: 25,
            date_archive_url: None,
            pk_in_url: true,
            rss_items: 20,
            required_fields: BTreeMap::new(),
            images: ImagesConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.per_page == 0 {
            return Err(ConfigError::Validation("per_page must be at least 1".into()));
        }
        if let Some(archive) = &self.date_archive_url
            && !is_valid_slug(archive)
        {
            return Err(ConfigError::Validation(format!(
                "date_archive_url '{archive}' is not a valid slug"
            )));
        }
        for (taxonomy, fields) in &self.required_fields {
            if !is_valid_slug_path(taxonomy) {
                return Err(ConfigError::Validation(format!(
                    "required_fields key '{taxonomy}' is not a valid taxonomy slug path"
                )));
            }
            if let Some(bad) = fields
                .iter()
                .find(|f| !REQUIRABLE_FIELDS.contains(&f.as_str()))
            {
                return Err(ConfigError::Validation(format!(
                    "required_fields.\"{taxonomy}\" names unknown field '{bad}' (expected one of {})",
                    REQUIRABLE_FIELDS.join(", ")
                )));
            }
        }
        self.images.validate()
    }
}

/// Bounding boxes for cached image variants, as `[max_width, max_height]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Inline document images that do not name a size.
    pub default_size: [u32; 2],
    /// Gallery item pages.
    pub gallery_size: [u32; 2],
    /// Gallery listing thumbnails.
    pub thumbnail_size: [u32; 2],
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            default_size: [1200, 1200],
            gallery_size: [1600, 1600],
            thumbnail_size: [400, 400],
        }
    }
}

impl ImagesConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, size) in [
            ("default_size", self.default_size),
            ("gallery_size", self.gallery_size),
            ("thumbnail_size", self.thumbnail_size),
        ] {
            if size[0] == 0 || size[1] == 0 {
                return Err(ConfigError::Validation(format!(
                    "images.{name} values must be non-zero"
                )));
            }
        }
        Ok(())
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image and copy workers.
    /// When absent, defaults to the number of CPU cores.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Configuration of a subsite, read from a `config.toml` below `content/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubsiteConfig {
    /// Slug of the document the subsite's urls are nested under.
    pub parent_slug: String,
    /// Slug of the subsite root; also its url segment.
    pub subsite_slug: String,
    /// Prefix for template names rendered inside the subsite.
    #[serde(default)]
    pub template_path_prefix: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub per_page: Option<usize>,
}

impl SubsiteConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("parent_slug", &self.parent_slug),
            ("subsite_slug", &self.subsite_slug),
        ] {
            if !is_valid_slug(value) {
                return Err(ConfigError::Validation(format!(
                    "{key} '{value}' is not a valid slug"
                )));
            }
        }
        if self.per_page == Some(0) {
            return Err(ConfigError::Validation("per_page must be at least 1".into()));
        }
        Ok(())
    }

    /// Listing page size, falling back to the site's.
    pub fn per_page(&self, site: &SiteConfig) -> usize {
        self.per_page.unwrap_or(site.per_page)
    }

    pub fn title<'a>(&'a self, site: &'a SiteConfig) -> &'a str {
        self.title.as_deref().unwrap_or(&site.title)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse a site config file's text: stock defaults, user values on top, validated.
pub fn parse_site_config(text: &str) -> Result<SiteConfig, ConfigError> {
    let overlay: toml::Value = toml::from_str(text)?;
    let merged = merge_toml(stock_defaults_value()?, overlay);
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the site config from `config.toml` in `site_root`.
///
/// A missing file yields the stock defaults.
pub fn load_site_config(site_root: &Path) -> Result<SiteConfig, ConfigError> {
    let path = site_root.join(CONFIG_FILENAME);
    if !path.exists() {
        return Ok(SiteConfig::default());
    }
    parse_site_config(&fs::read_to_string(path)?)
}

/// Load and validate a subsite config file.
pub fn load_subsite_config(path: &Path) -> Result<SubsiteConfig, ConfigError> {
    let config: SubsiteConfig = toml::from_str(&fs::read_to_string(path)?)?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock site `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# sitewright site configuration
# =============================
# All settings are optional. Values shown below are the defaults.
# Unknown keys cause an error.
#
# A config.toml inside content/ declares a subsite instead; see the
# subsite section at the bottom.

title = "Untitled"
description = ""

# Scheme and host used for absolute links in index.xml and sitemap.xml.
base_url = "http://localhost"

# Items per listing page (home, taxonomy and archive listings).
per_page = 25

# Slug of the date archive root. Leave unset to skip date archives.
# date_archive_url = "archive"

# Prefix the url of documents that have a pk: /42-my-post/ instead of /my-post/.
pk_in_url = true

# Number of entries in index.xml.
rss_items = 20

# ---------------------------------------------------------------------------
# Required meta fields per taxonomy
# ---------------------------------------------------------------------------
[required_fields]
# "types/articles" = ["title", "description"]

# ---------------------------------------------------------------------------
# Cached image bounding boxes, [max_width, max_height]
# ---------------------------------------------------------------------------
[images]
default_size = [1200, 1200]
gallery_size = [1600, 1600]
thumbnail_size = [400, 400]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image and copy workers.
# Omit to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Subsite config (content/<dir>/config.toml), not valid at the site root
# ---------------------------------------------------------------------------
# parent_slug = "about"
# subsite_slug = "notes"
# template_path_prefix = "notes"
# title = "Notes"
# per_page = 10
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = SiteConfig::default();
        assert_eq!(config.per_page, 25);
        assert!(config.pk_in_url);
        assert_eq!(config.date_archive_url, None);
        assert_eq!(config.images.gallery_size, [1600, 1600]);
        config.validate().unwrap();
    }

    #[test]
    fn parse_partial_config_keeps_defaults() {
        let config = parse_site_config(
            r#"
title = "Field Notes"
[images]
thumbnail_size = [300, 200]
"#,
        )
        .unwrap();
        assert_eq!(config.title, "Field Notes");
        assert_eq!(config.images.thumbnail_size, [300, 200]);
        assert_eq!(config.images.gallery_size, [1600, 1600]);
        assert_eq!(config.per_page, 25);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(matches!(
            parse_site_config("titel = \"typo\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config = parse_site_config(stock_config_toml()).unwrap();
        assert_eq!(config, SiteConfig::default());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn zero_per_page_rejected() {
        let result = parse_site_config("per_page = 0");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn malformed_archive_slug_rejected() {
        let result = parse_site_config("date_archive_url = \"Archive\"");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn required_fields_must_be_known() {
        let ok = parse_site_config("[required_fields]\n\"types/articles\" = [\"title\"]");
        assert!(ok.is_ok());
        let bad = parse_site_config("[required_fields]\n\"types/articles\" = [\"colour\"]");
        assert!(matches!(bad, Err(ConfigError::Validation(msg)) if msg.contains("colour")));
    }

    #[test]
    fn zero_image_size_rejected() {
        let result = parse_site_config("[images]\ngallery_size = [0, 100]");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // Loading
    // =========================================================================

    #[test]
    fn load_site_config_defaults_when_missing() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(load_site_config(tmp.path()).unwrap(), SiteConfig::default());
    }

    #[test]
    fn load_site_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "per_page = 10").unwrap();
        assert_eq!(load_site_config(tmp.path()).unwrap().per_page, 10);
    }

    #[test]
    fn subsite_config_inherits_site_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&path, "parent_slug = \"about\"\nsubsite_slug = \"notes\"").unwrap();
        let sub = load_subsite_config(&path).unwrap();
        let site = SiteConfig {
            per_page: 7,
            ..SiteConfig::default()
        };
        assert_eq!(sub.per_page(&site), 7);
        assert_eq!(sub.title(&site), "Untitled");
        assert_eq!(sub.template_path_prefix, None);
    }

    #[test]
    fn subsite_config_requires_slugs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&path, "parent_slug = \"about\"").unwrap();
        assert!(matches!(
            load_subsite_config(&path),
            Err(ConfigError::Toml(_))
        ));
        fs::write(&path, "parent_slug = \"About\"\nsubsite_slug = \"notes\"").unwrap();
        assert!(matches!(
            load_subsite_config(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn effective_threads_clamps() {
        let cores = effective_threads(&ProcessingConfig::default());
        assert!(cores >= 1);
        let one = effective_threads(&ProcessingConfig {
            max_processes: Some(1),
        });
        assert_eq!(one, 1);
        let huge = effective_threads(&ProcessingConfig {
            max_processes: Some(100_000),
        });
        assert_eq!(huge, cores);
    }
}
