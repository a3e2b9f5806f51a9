//! Shared test utilities: a throwaway site directory with helpers to write
//! documents, taxonomy nodes, config and real images into it.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::SiteFixture;
//!
//! let fx = SiteFixture::new();
//! fx.taxonomy("topics", "Topics", "");
//! fx.page("content/a.md", "slug = \"a\"\n[meta.taxonomy]\ntopics = true", "Body.");
//! let site = fx.build().unwrap();
//! assert!(site.routes.contains("/topics/"));
//! ```

use crate::router::{BuildError, BuildOptions, Router, Site};
use crate::source::MarkdownSource;
use crate::theme::Theme;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

pub struct SiteFixture {
    dir: TempDir,
}

impl SiteFixture {
    /// An empty site: just `content/`.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("content")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `text` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, text: &str) -> PathBuf {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, text).unwrap();
        path
    }

    /// Site `config.toml`.
    pub fn config(&self, toml: &str) {
        self.write("config.toml", toml);
    }

    /// A markdown document whose `[meta]` table holds `meta`.
    pub fn page(&self, rel: &str, meta: &str, body: &str) -> PathBuf {
        self.write(rel, &format!("+++\n[meta]\n{meta}\n+++\n{body}\n"))
    }

    /// A taxonomy node at `taxonomy/<slug_path>.md`; `extra` is appended
    /// to its `[meta]` table.
    pub fn taxonomy(&self, slug_path: &str, title: &str, extra: &str) -> PathBuf {
        self.page(
            &format!("taxonomy/{slug_path}.md"),
            &format!("slug = \"{slug_path}\"\ntitle = \"{title}\"\n{extra}"),
            "",
        )
    }

    /// A real PNG of the given size.
    pub fn image(&self, rel: &str, width: u32, height: u32) -> PathBuf {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]))
            .save(&path)
            .unwrap();
        path
    }

    /// Push the mtime of `rel` forward so the next build sees a change.
    pub fn touch(&self, rel: &str) {
        let file = fs::File::options()
            .write(true)
            .open(self.root().join(rel))
            .unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
    }

    /// Build with the markdown source, the built-in theme and the cache on.
    pub fn build(&self) -> Result<Site, BuildError> {
        Router::build(
            self.root(),
            &BuildOptions::default(),
            &MarkdownSource,
            &Theme,
        )
    }
}
