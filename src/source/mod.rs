//! Document sources: turning a content or taxonomy file into a rendered body
//! plus its context and collectors.
//!
//! The build engine never looks inside a markup format. It talks to a
//! [`DocumentSource`] that parses a file into a [`DocumentTree`]; the tree
//! validates itself against the [`Registry`] schema, renders its body and
//! exposes:
//!
//! - **context**: the nested, string-keyed metadata (everything under `meta`)
//! - **collectors**: named, ordered lists of rendered fragments gathered from
//!   anywhere in the document (`sum` for inline summaries, `footnotes`)
//!
//! A live tree may hold state that cannot outlive a build. The only thing the
//! cache persists is the [`RenderResult`] snapshot of its context and
//! collectors.
//!
//! [`MarkdownSource`] is the default implementation: TOML front matter and a
//! CommonMark body.

pub mod markdown;
pub mod registry;

pub use markdown::MarkdownSource;
pub use registry::{NodeKind, Registry, SchemaError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Nested string-keyed metadata of a document.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Named, ordered fragment lists.
pub type Collectors = BTreeMap<String, Vec<String>>;

/// Collector holding inline summary fragments.
pub const SUMMARY_COLLECTOR: &str = "sum";

/// Collector holding rendered footnote definitions.
pub const FOOTNOTE_COLLECTOR: &str = "footnotes";

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: front matter: {message}", srp.display())]
    FrontMatter { srp: PathBuf, message: String },
    #[error("{}: {source}", srp.display())]
    Schema { srp: PathBuf, source: SchemaError },
    #[error("{}: {message}", srp.display())]
    Invalid { srp: PathBuf, message: String },
    #[error("{}: link to unknown pk {pk}", srp.display())]
    UnknownPk { srp: PathBuf, pk: u64 },
    #[error("{}: image '{image}': {message}", srp.display())]
    Image {
        srp: PathBuf,
        image: String,
        message: String,
    },
}

/// Which schema a document is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocKind {
    Content,
    Taxonomy,
}

/// How much of a document to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Front matter, validation, body.
    Full,
    /// Only the `meta` subtree. Never rendered, never cached.
    MetaOnly,
}

/// Everything a source needs to locate and parse one document.
#[derive(Debug, Clone, Copy)]
pub struct ParseRequest<'a> {
    /// Absolute path of the file.
    pub path: &'a Path,
    /// Site-relative path, used in error messages and to resolve relative assets.
    pub srp: &'a Path,
    pub kind: DocKind,
    pub mode: ParseMode,
}

/// Persistable snapshot of a rendered tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderResult {
    pub context: Context,
    pub collectors: Collectors,
}

impl RenderResult {
    /// Fragments gathered under `name`, empty when none were.
    pub fn collected(&self, name: &str) -> &[String] {
        self.collectors.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Served locations of a cached image variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUrls {
    pub key: String,
    pub url: String,
    pub original_url: String,
}

/// Callbacks a tree may need while rendering its body.
pub trait RenderHooks {
    /// Canonical url of the document with the given PK.
    fn url_for_pk(&self, pk: u64) -> Option<String>;

    /// Register a resized variant of an image referenced by the document at
    /// `doc_srp`. `size` of `None` means the site's default inline size.
    fn image(
        &mut self,
        doc_srp: &Path,
        rel: &str,
        size: Option<(u32, u32)>,
        copy_original: bool,
    ) -> Result<ImageUrls, String>;
}

/// A parsed document.
pub trait DocumentTree {
    /// Structural validation against the schema and the document rules.
    fn pre_render(&mut self, registry: &Registry) -> Result<(), SourceError>;

    /// Render the body, filling collectors and derived context entries.
    fn render(&mut self, hooks: &mut dyn RenderHooks) -> Result<String, SourceError>;

    fn context(&self) -> &Context;

    fn collectors(&self) -> &Collectors;

    fn snapshot(&self) -> RenderResult {
        RenderResult {
            context: self.context().clone(),
            collectors: self.collectors().clone(),
        }
    }
}

/// Parses files into [`DocumentTree`]s.
pub trait DocumentSource: Sync {
    fn parse(&self, request: &ParseRequest<'_>) -> Result<Box<dyn DocumentTree>, SourceError>;
}
