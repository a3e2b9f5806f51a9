//! Incremental build cache ("wisdom").
//!
//! Rendering markdown, resizing images and re-copying assets on every build
//! is wasted work when nothing changed. The cache remembers, per source
//! file, the modification time it last saw and the artifact it derived, and
//! hands the artifact back while the mtime stays the same.
//!
//! # Maps
//!
//! | Map | Key | Artifact |
//! |---|---|---|
//! | `render` | srp | rendered body (mirrored under `_wisdom/`) + [`RenderResult`] |
//! | `images` | `(srp, max_w, max_h)` | resized PNG under `_wisdom/image_cache/` + served urls |
//! | `statics` | path under `theme/static/` | fingerprinted file name |
//! | `config` / `subsites` | srp | parsed configuration |
//!
//! A render hit requires both a matching mtime **and** the mirrored html
//! file still on disk. Meta-only parses never touch the cache.
//!
//! Image resizing is deferred: [`Wisdom::get_or_create_image`] only records
//! the variant and its urls. [`Wisdom::materialize_images`] does the pixel
//! work once, at publish time, re-checking each source's mtime.
//!
//! Entries are never deleted. An image entry whose source disappeared is
//! logged and skipped.
//!
//! # Storage
//!
//! Everything lives in one JSON file, `_wisdom/wisdom.json`, rewritten
//! after every mutation through a temp file and rename. A missing, corrupt
//! or wrong-version file loads as an empty cache, as does `--no-cache`.

use crate::config::ConfigError;
use crate::imaging::{BackendError, ImageBackend, ResizeParams};
use crate::source::{
    DocKind, DocumentSource, ImageUrls, ParseMode, ParseRequest, Registry, RenderHooks,
    RenderResult, SourceError,
};
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Cache directory under the site root.
pub const WISDOM_DIR: &str = "_wisdom";

/// Url prefix of resized and original images.
pub const IMAGE_URL: &str = "_img";

const STORE_FILENAME: &str = "wisdom.json";

/// Bump to invalidate every existing cache.
const STORE_VERSION: u32 = 1;

const IMAGE_CACHE_DIR: &str = "image_cache";

/// Static extensions served under a fingerprinted name.
const BUSTED_EXTENSIONS: &[&str] = &["css", "js"];

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("cache store: {0}")]
    Store(#[from] serde_json::Error),
    #[error("{}: {source}", path.display())]
    Config { path: PathBuf, source: ConfigError },
    #[error("{}: image '{image}' does not exist", doc.display())]
    MissingImage { doc: PathBuf, image: String },
    #[error("{}: image '{image}' is outside the site root", doc.display())]
    ImageEscapes { doc: PathBuf, image: String },
    #[error("resizing {}: {source}", path.display())]
    Resize { path: PathBuf, source: BackendError },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn mtime_of(path: &Path) -> Result<SystemTime, CacheError> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(io_err(path))
}

/// `/`-joined form of a relative path, used for keys and urls.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RenderEntry {
    mtime: SystemTime,
    result: RenderResult,
}

/// A recorded image variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Source image, relative to the site root.
    pub source: String,
    pub max_width: u32,
    pub max_height: u32,
    pub copy_original: bool,
    /// Resized file, relative to the cache directory.
    pub cached: String,
    pub url: String,
    pub original_url: String,
    /// Source mtime at the last resize; `None` until materialized.
    pub resized_at: Option<SystemTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StaticEntry {
    mtime: SystemTime,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigEntry {
    mtime: SystemTime,
    value: serde_json::Value,
}

/// Which configuration map a [`Wisdom::get_config`] call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigBucket {
    Site,
    Subsite,
}

#[derive(Debug, Serialize, Deserialize)]
struct Store {
    version: u32,
    render: BTreeMap<String, RenderEntry>,
    images: BTreeMap<String, ImageEntry>,
    statics: BTreeMap<String, StaticEntry>,
    config: BTreeMap<String, ConfigEntry>,
    subsites: BTreeMap<String, ConfigEntry>,
}

impl Store {
    fn empty() -> Self {
        Self {
            version: STORE_VERSION,
            render: BTreeMap::new(),
            images: BTreeMap::new(),
            statics: BTreeMap::new(),
            config: BTreeMap::new(),
            subsites: BTreeMap::new(),
        }
    }

    fn load(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::empty();
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(store) if store.version == STORE_VERSION => store,
            Ok(_) => {
                tracing::info!("cache format changed, starting fresh");
                Self::empty()
            }
            Err(e) => {
                tracing::warn!(error = %e, "unreadable cache, starting fresh");
                Self::empty()
            }
        }
    }
}

/// Cache key of an image variant.
pub fn image_key(source: &str, max_width: u32, max_height: u32) -> String {
    format!("{source}@{max_width}x{max_height}")
}

/// Summary of cache performance for a build run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
    pub resized: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} rendered ({} total)",
                self.hits,
                self.misses,
                self.total()
            )?;
        } else {
            write!(f, "{} rendered", self.misses)?;
        }
        if self.resized > 0 {
            write!(f, ", {} images resized", self.resized)?;
        }
        Ok(())
    }
}

/// The persistent cache of one site.
#[derive(Debug)]
pub struct Wisdom {
    root: PathBuf,
    dir: PathBuf,
    store: Store,
    default_image_size: (u32, u32),
    pub stats: CacheStats,
}

impl Wisdom {
    /// Open the cache of the site at `root`. With `use_cache` false the
    /// stored state is ignored (and overwritten on the first save).
    pub fn open(root: &Path, use_cache: bool) -> Self {
        let dir = root.join(WISDOM_DIR);
        let store = if use_cache {
            Store::load(&dir.join(STORE_FILENAME))
        } else {
            Store::empty()
        };
        Self {
            root: root.to_path_buf(),
            dir,
            store,
            default_image_size: (1200, 1200),
            stats: CacheStats::default(),
        }
    }

    /// Bounding box for inline images that do not name one.
    pub fn set_default_image_size(&mut self, size: [u32; 2]) {
        self.default_image_size = (size[0], size[1]);
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the whole store through a temp file and rename.
    pub fn save(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let path = self.dir.join(STORE_FILENAME);
        let tmp = self.dir.join(format!("{STORE_FILENAME}.tmp"));
        let json = serde_json::to_string_pretty(&self.store)?;
        fs::write(&tmp, json).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))
    }

    fn cached_html_path(&self, srp: &Path) -> PathBuf {
        let mut name = srp.as_os_str().to_owned();
        name.push(".html");
        self.dir.join(name)
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Rendered body and snapshot of the document at `srp`, rendering only
    /// when the file changed since it was last cached.
    pub fn get_or_render(
        &mut self,
        srp: &Path,
        kind: DocKind,
        source: &dyn DocumentSource,
        registry: &Registry,
        links: &dyn Fn(u64) -> Option<String>,
    ) -> Result<(String, RenderResult), CacheError> {
        let key = slash_path(srp);
        let path = self.root.join(srp);
        let mtime = mtime_of(&path)?;
        let html_path = self.cached_html_path(srp);

        if let Some(entry) = self.store.render.get(&key)
            && entry.mtime == mtime
            && html_path.exists()
        {
            let body = fs::read_to_string(&html_path).map_err(io_err(&html_path))?;
            tracing::debug!(srp = %key, "render cache hit");
            self.stats.hit();
            return Ok((body, entry.result.clone()));
        }

        tracing::debug!(srp = %key, "rendering");
        let mut tree = source.parse(&ParseRequest {
            path: &path,
            srp,
            kind,
            mode: ParseMode::Full,
        })?;
        tree.pre_render(registry)?;
        let body = {
            let mut hooks = CacheHooks {
                root: &self.root,
                images: &mut self.store.images,
                links,
                default_size: self.default_image_size,
            };
            tree.render(&mut hooks)?
        };

        if let Some(parent) = html_path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        fs::write(&html_path, &body).map_err(io_err(&html_path))?;
        let result = tree.snapshot();
        self.store.render.insert(
            key,
            RenderEntry {
                mtime,
                result: result.clone(),
            },
        );
        self.stats.miss();
        self.save()?;
        Ok((body, result))
    }

    /// Metadata-only parse of the document at `srp`. Never cached.
    pub fn get_meta(
        &self,
        srp: &Path,
        kind: DocKind,
        source: &dyn DocumentSource,
        registry: &Registry,
    ) -> Result<RenderResult, CacheError> {
        let path = self.root.join(srp);
        let mut tree = source.parse(&ParseRequest {
            path: &path,
            srp,
            kind,
            mode: ParseMode::MetaOnly,
        })?;
        tree.pre_render(registry)?;
        Ok(tree.snapshot())
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// Record a resized variant of `rel`, an image path relative to the
    /// document at `doc_srp`. The resize itself happens in
    /// [`materialize_images`](Self::materialize_images).
    pub fn get_or_create_image(
        &mut self,
        doc_srp: &Path,
        rel: &str,
        max_width: u32,
        max_height: u32,
        copy_original: bool,
    ) -> Result<ImageUrls, CacheError> {
        let urls = register_image(
            &self.root,
            &mut self.store.images,
            doc_srp,
            rel,
            (max_width, max_height),
            copy_original,
        )?;
        self.save()?;
        Ok(urls)
    }

    /// All recorded image variants, in key order.
    pub fn image_entries(&self) -> impl Iterator<Item = &ImageEntry> {
        self.store.images.values()
    }

    /// Resize every variant whose source changed or whose cached file is
    /// gone. Returns the variants whose sources still exist.
    pub fn materialize_images(
        &mut self,
        backend: &dyn ImageBackend,
    ) -> Result<Vec<ImageEntry>, CacheError> {
        let mut live = Vec::new();
        let mut jobs = Vec::new();
        for (key, entry) in &self.store.images {
            let source = self.root.join(&entry.source);
            let Ok(mtime) = mtime_of(&source) else {
                tracing::warn!(image = %entry.source, "stale image cache entry, source is gone");
                continue;
            };
            let cached = self.dir.join(&entry.cached);
            if entry.resized_at != Some(mtime) || !cached.exists() {
                jobs.push((
                    key.clone(),
                    mtime,
                    ResizeParams {
                        source,
                        output: cached,
                        max_width: entry.max_width,
                        max_height: entry.max_height,
                    },
                ));
            }
            live.push(entry.clone());
        }

        let results: Vec<_> = jobs
            .par_iter()
            .map(|(key, mtime, params)| {
                tracing::debug!(image = %params.source.display(), "resizing");
                backend
                    .resize(params)
                    .map(|()| (key.clone(), *mtime))
                    .map_err(|source| CacheError::Resize {
                        path: params.source.clone(),
                        source,
                    })
            })
            .collect();

        for result in results {
            let (key, mtime) = result?;
            if let Some(entry) = self.store.images.get_mut(&key) {
                entry.resized_at = Some(mtime);
            }
            self.stats.resized += 1;
            self.save()?;
        }
        Ok(live)
    }

    // =========================================================================
    // Static assets
    // =========================================================================

    /// Served name of a static asset at `rel` (relative to the static root,
    /// `/`-separated). Stylesheets and scripts get a random suffix that is
    /// kept while the file's mtime is unchanged.
    pub fn fingerprinted_name(&mut self, source: &Path, rel: &str) -> Result<String, CacheError> {
        let path = Path::new(rel);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        if !ext
            .as_deref()
            .is_some_and(|e| BUSTED_EXTENSIONS.contains(&e))
        {
            return Ok(rel.to_string());
        }
        let mtime = mtime_of(source)?;
        if let Some(entry) = self.store.statics.get(rel)
            && entry.mtime == mtime
        {
            return Ok(entry.name.clone());
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!("{stem}_{suffix}.{}", ext.unwrap_or_default());
        let name = match rel.rsplit_once('/') {
            Some((dir, _)) => format!("{dir}/{file_name}"),
            None => file_name,
        };
        tracing::debug!(asset = rel, name = %name, "fingerprinted");
        self.store.statics.insert(
            rel.to_string(),
            StaticEntry {
                mtime,
                name: name.clone(),
            },
        );
        self.save()?;
        Ok(name)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Parsed configuration at `srp`, re-read only when the file changed.
    pub fn get_config<T, F>(
        &mut self,
        bucket: ConfigBucket,
        srp: &Path,
        load: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&Path) -> Result<T, ConfigError>,
    {
        let key = slash_path(srp);
        let path = self.root.join(srp);
        let mtime = mtime_of(&path)?;
        let map = match bucket {
            ConfigBucket::Site => &mut self.store.config,
            ConfigBucket::Subsite => &mut self.store.subsites,
        };
        if let Some(entry) = map.get(&key)
            && entry.mtime == mtime
            && let Ok(value) = serde_json::from_value::<T>(entry.value.clone())
        {
            return Ok(value);
        }
        let config = load(&path).map_err(|source| CacheError::Config {
            path: srp.to_path_buf(),
            source,
        })?;
        map.insert(
            key,
            ConfigEntry {
                mtime,
                value: serde_json::to_value(&config)?,
            },
        );
        self.save()?;
        Ok(config)
    }
}

/// Resolve `rel` against the directory of `doc_srp` and record the variant.
fn register_image(
    root: &Path,
    images: &mut BTreeMap<String, ImageEntry>,
    doc_srp: &Path,
    rel: &str,
    (max_width, max_height): (u32, u32),
    copy_original: bool,
) -> Result<ImageUrls, CacheError> {
    let doc_dir = doc_srp.parent().unwrap_or(Path::new(""));
    let candidate = root.join(doc_dir).join(rel);
    let missing = || CacheError::MissingImage {
        doc: doc_srp.to_path_buf(),
        image: rel.to_string(),
    };
    let resolved = candidate.canonicalize().map_err(|_| missing())?;
    if !resolved.is_file() {
        return Err(missing());
    }
    let canonical_root = root.canonicalize().map_err(io_err(root))?;
    let site_rel = resolved
        .strip_prefix(&canonical_root)
        .map_err(|_| CacheError::ImageEscapes {
            doc: doc_srp.to_path_buf(),
            image: rel.to_string(),
        })?;
    let source = slash_path(site_rel);
    let key = image_key(&source, max_width, max_height);

    if let Some(entry) = images.get_mut(&key) {
        entry.copy_original = copy_original;
        return Ok(ImageUrls {
            key,
            url: entry.url.clone(),
            original_url: entry.original_url.clone(),
        });
    }

    let stem = site_rel
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = site_rel.parent().map(slash_path).unwrap_or_default();
    let in_parent = |name: String| {
        if parent.is_empty() {
            name
        } else {
            format!("{parent}/{name}")
        }
    };
    let mut variant = in_parent(format!("{stem}_{max_width}_{max_height}.png"));
    // `photo.jpg` and `photo.png` next to each other share a stem.
    let taken = |variant: &str| {
        let cached = format!("{IMAGE_CACHE_DIR}/{variant}");
        images
            .values()
            .any(|e| e.cached == cached && e.source != source)
    };
    if taken(&variant) {
        let ext = site_rel
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        variant = in_parent(format!("{stem}_{ext}_{max_width}_{max_height}.png"));
    }
    let entry = ImageEntry {
        source: source.clone(),
        max_width,
        max_height,
        copy_original,
        cached: format!("{IMAGE_CACHE_DIR}/{variant}"),
        url: format!("/{IMAGE_URL}/{variant}"),
        original_url: format!("/{IMAGE_URL}/{source}"),
        resized_at: None,
    };
    let urls = ImageUrls {
        key: key.clone(),
        url: entry.url.clone(),
        original_url: entry.original_url.clone(),
    };
    images.insert(key, entry);
    Ok(urls)
}

/// Render-time callbacks backed by the cache's image map.
struct CacheHooks<'a> {
    root: &'a Path,
    images: &'a mut BTreeMap<String, ImageEntry>,
    links: &'a dyn Fn(u64) -> Option<String>,
    default_size: (u32, u32),
}

impl RenderHooks for CacheHooks<'_> {
    fn url_for_pk(&self, pk: u64) -> Option<String> {
        (self.links)(pk)
    }

    fn image(
        &mut self,
        doc_srp: &Path,
        rel: &str,
        size: Option<(u32, u32)>,
        copy_original: bool,
    ) -> Result<ImageUrls, String> {
        register_image(
            self.root,
            self.images,
            doc_srp,
            rel,
            size.unwrap_or(self.default_size),
            copy_original,
        )
        .map_err(|e| e.to_string())
    }
}
