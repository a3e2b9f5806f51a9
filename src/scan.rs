//! Filesystem discovery.
//!
//! Finds the inputs of a build; reads nothing but directory listings.
//!
//! ```text
//! site/
//! ├── config.toml           # site config (optional)
//! ├── content/              # *.md documents; config.toml files declare subsites
//! ├── taxonomy/             # *.md taxonomy nodes (optional)
//! └── theme/static/         # assets served under /_static/ (optional)
//! ```
//!
//! Every list is sorted so that builds visit files in the same order on
//! every run. Hidden files and directories (`.git`, `.DS_Store`) are skipped.

use crate::config::CONFIG_FILENAME;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

pub const CONTENT_DIR: &str = "content";
pub const TAXONOMY_DIR: &str = "taxonomy";
pub const STATIC_DIR: &str = "theme/static";

/// Image files a gallery document picks up from its directory.
pub const GALLERY_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("{} is not a site: no content/ directory", .0.display())]
    NotASite(PathBuf),
}

/// A static asset under `theme/static/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFile {
    /// Absolute path.
    pub source: PathBuf,
    /// Path below the static root, `/`-separated.
    pub rel: String,
}

/// Source files of a site. Document paths are site-relative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteFiles {
    pub content: Vec<PathBuf>,
    pub taxonomy: Vec<PathBuf>,
    pub subsite_configs: Vec<PathBuf>,
    pub statics: Vec<StaticFile>,
}

pub fn scan(root: &Path) -> Result<SiteFiles, ScanError> {
    let content_dir = root.join(CONTENT_DIR);
    if !content_dir.is_dir() {
        return Err(ScanError::NotASite(root.to_path_buf()));
    }

    let mut files = SiteFiles::default();
    for path in walk_files(&content_dir)? {
        let srp = site_relative(root, &path);
        if has_extension(&path, &["md"]) {
            files.content.push(srp);
        } else if path.file_name().is_some_and(|n| n == CONFIG_FILENAME) {
            files.subsite_configs.push(srp);
        }
    }

    let taxonomy_dir = root.join(TAXONOMY_DIR);
    if taxonomy_dir.is_dir() {
        files.taxonomy = walk_files(&taxonomy_dir)?
            .into_iter()
            .filter(|p| has_extension(p, &["md"]))
            .map(|p| site_relative(root, &p))
            .collect();
    }

    let static_dir = root.join(STATIC_DIR);
    if static_dir.is_dir() {
        files.statics = walk_files(&static_dir)?
            .into_iter()
            .map(|source| StaticFile {
                rel: crate::cache::slash_path(&site_relative(&static_dir, &source)),
                source,
            })
            .collect();
    }
    Ok(files)
}

/// Gallery images below the directory of the document at `doc_srp`, as
/// `/`-separated paths relative to that directory.
pub fn gallery_images(root: &Path, doc_srp: &Path) -> Result<Vec<String>, ScanError> {
    let doc_dir = root.join(doc_srp.parent().unwrap_or(Path::new("")));
    Ok(walk_files(&doc_dir)?
        .into_iter()
        .filter(|p| has_extension(p, GALLERY_EXTENSIONS))
        .map(|p| crate::cache::slash_path(&site_relative(&doc_dir, &p)))
        .collect())
}

fn walk_files(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| extensions.contains(&e.as_str()))
}

fn site_relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
