//! Slugs, PKs and urls.
//!
//! Slugs share one namespace: content documents, taxonomy slug paths and
//! subsite slugs. [`SlugMap`] holds all of them and refuses a second owner
//! for any slug, naming both source files.
//!
//! A document's url is a list of components built by walking up through
//! subsites:
//!
//! ```text
//! content/about.md          slug "about"                -> /about/
//! content/notes/config.toml parent "about", slug "notes" -> /about/notes/
//! content/notes/first.md    slug "first", pk 7           -> /about/notes/7-first/
//! ```
//!
//! [`SubsiteIndex`] answers which subsite, if any, a source path belongs to:
//! the one whose directory is the longest prefix of the path.

use crate::config::SubsiteConfig;
use crate::endpoint::format_url;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("slug '{slug}' is used by both {} and {}", first.display(), second.display())]
    SlugCollision {
        slug: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("pk {pk} is used by both {} and {}", first.display(), second.display())]
    DuplicatePk {
        pk: u64,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("{}: parent slug '{parent}' does not exist", srp.display())]
    UnknownParent { srp: PathBuf, parent: String },
    #[error("unknown slug '{0}'")]
    UnknownSlug(String),
    #[error("{}: subsite '{slug}' is nested under itself", srp.display())]
    SubsiteCycle { srp: PathBuf, slug: String },
}

/// What owns a slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlugTarget {
    Taxonomy,
    Content {
        pk: Option<u64>,
        /// Slug of the enclosing subsite.
        subsite: Option<String>,
    },
    Subsite {
        parent_slug: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugEntry {
    pub srp: PathBuf,
    /// Final url component.
    pub last_url_part: String,
    pub target: SlugTarget,
}

#[derive(Debug, Clone, Default)]
pub struct SlugMap {
    entries: BTreeMap<String, SlugEntry>,
    pks: BTreeMap<u64, String>,
    pk_in_url: bool,
}

impl SlugMap {
    /// `pk_in_url` makes the last url part of a PK document `"{pk}-{slug}"`.
    pub fn new(pk_in_url: bool) -> Self {
        Self {
            pk_in_url,
            ..Self::default()
        }
    }

    fn insert(&mut self, slug: &str, entry: SlugEntry) -> Result<(), ResolveError> {
        if let Some(existing) = self.entries.get(slug) {
            return Err(ResolveError::SlugCollision {
                slug: slug.to_string(),
                first: existing.srp.clone(),
                second: entry.srp,
            });
        }
        self.entries.insert(slug.to_string(), entry);
        Ok(())
    }

    pub fn insert_taxonomy(&mut self, slug_path: &str, srp: &Path) -> Result<(), ResolveError> {
        self.insert(
            slug_path,
            SlugEntry {
                srp: srp.to_path_buf(),
                last_url_part: crate::slug::leaf(slug_path).to_string(),
                target: SlugTarget::Taxonomy,
            },
        )
    }

    pub fn insert_content(
        &mut self,
        srp: &Path,
        slug: &str,
        pk: Option<u64>,
        subsite: Option<String>,
    ) -> Result<(), ResolveError> {
        if let Some(pk) = pk
            && let Some(owner) = self.pks.get(&pk).and_then(|s| self.entries.get(s))
        {
            return Err(ResolveError::DuplicatePk {
                pk,
                first: owner.srp.clone(),
                second: srp.to_path_buf(),
            });
        }
        let last_url_part = match pk {
            Some(pk) if self.pk_in_url => format!("{pk}-{slug}"),
            _ => slug.to_string(),
        };
        self.insert(
            slug,
            SlugEntry {
                srp: srp.to_path_buf(),
                last_url_part,
                target: SlugTarget::Content { pk, subsite },
            },
        )?;
        if let Some(pk) = pk {
            self.pks.insert(pk, slug.to_string());
        }
        Ok(())
    }

    pub fn insert_subsite(&mut self, config_srp: &Path, config: &SubsiteConfig) -> Result<(), ResolveError> {
        self.insert(
            &config.subsite_slug,
            SlugEntry {
                srp: config_srp.to_path_buf(),
                last_url_part: config.subsite_slug.clone(),
                target: SlugTarget::Subsite {
                    parent_slug: config.parent_slug.clone(),
                },
            },
        )
    }

    pub fn get(&self, slug: &str) -> Option<&SlugEntry> {
        self.entries.get(slug)
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.entries.contains_key(slug)
    }

    pub fn slug_for_pk(&self, pk: u64) -> Option<&str> {
        self.pks.get(&pk).map(String::as_str)
    }

    pub fn pk_count(&self) -> usize {
        self.pks.len()
    }

    /// Url components of the slug's owner, walking up through subsites.
    pub fn resolve_url_components(&self, slug: &str) -> Result<Vec<String>, ResolveError> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = slug.to_string();
        loop {
            let entry = self
                .entries
                .get(&current)
                .ok_or_else(|| ResolveError::UnknownSlug(current.clone()))?;
            if !seen.insert(current.clone()) {
                return Err(ResolveError::SubsiteCycle {
                    srp: entry.srp.clone(),
                    slug: current,
                });
            }
            let up = match &entry.target {
                SlugTarget::Taxonomy => {
                    chain.extend(current.split('/').rev().map(str::to_string));
                    None
                }
                SlugTarget::Content { subsite, .. } => {
                    chain.push(entry.last_url_part.clone());
                    subsite.clone()
                }
                SlugTarget::Subsite { parent_slug } => {
                    chain.push(entry.last_url_part.clone());
                    Some(parent_slug.clone())
                }
            };
            match up {
                Some(next) => current = next,
                None => break,
            }
        }
        chain.reverse();
        Ok(chain)
    }

    /// Canonical url of the document with the given PK.
    pub fn url_for_pk(&self, pk: u64) -> Option<String> {
        let slug = self.slug_for_pk(pk)?;
        let components = self.resolve_url_components(slug).ok()?;
        Some(format_url(&components, None))
    }

    /// Every subsite's parent slug must exist and its chain must end.
    pub fn check_subsites(&self) -> Result<(), ResolveError> {
        for (slug, entry) in &self.entries {
            if let SlugTarget::Subsite { parent_slug } = &entry.target {
                if !self.contains(parent_slug) {
                    return Err(ResolveError::UnknownParent {
                        srp: entry.srp.clone(),
                        parent: parent_slug.clone(),
                    });
                }
                self.resolve_url_components(slug)?;
            }
        }
        Ok(())
    }
}

/// A subsite declared by a `config.toml` below `content/`.
#[derive(Debug, Clone, PartialEq)]
pub struct Subsite {
    /// The config file.
    pub srp: PathBuf,
    /// Directory whose contents belong to the subsite.
    pub dir: PathBuf,
    pub config: SubsiteConfig,
}

impl Subsite {
    pub fn slug(&self) -> &str {
        &self.config.subsite_slug
    }
}

/// Longest-prefix lookup from a source path to its subsite.
#[derive(Debug, Clone, Default)]
pub struct SubsiteIndex {
    by_dir: BTreeMap<PathBuf, Subsite>,
}

impl SubsiteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subsite: Subsite) {
        self.by_dir.insert(subsite.dir.clone(), subsite);
    }

    pub fn len(&self) -> usize {
        self.by_dir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_dir.is_empty()
    }

    /// The innermost subsite whose directory contains `srp`.
    pub fn lookup(&self, srp: &Path) -> Option<&Subsite> {
        srp.parent()?
            .ancestors()
            .find_map(|dir| self.by_dir.get(dir))
    }

    pub fn get(&self, slug: &str) -> Option<&Subsite> {
        self.by_dir.values().find(|s| s.slug() == slug)
    }

    /// Subsites, shallowest directory first.
    pub fn iter(&self) -> impl Iterator<Item = &Subsite> {
        let mut all: Vec<&Subsite> = self.by_dir.values().collect();
        all.sort_by_key(|s| (s.dir.components().count(), s.dir.clone()));
        all.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subsite(dir: &str, parent: &str, slug: &str) -> Subsite {
        Subsite {
            srp: Path::new(dir).join("config.toml"),
            dir: PathBuf::from(dir),
            config: SubsiteConfig {
                parent_slug: parent.into(),
                subsite_slug: slug.into(),
                template_path_prefix: None,
                title: None,
                description: None,
                per_page: None,
            },
        }
    }

    #[test]
    fn last_url_part_carries_pk() {
        let mut map = SlugMap::new(true);
        map.insert_content(Path::new("content/foo.md"), "foo", Some(42), None).unwrap();
        map.insert_content(Path::new("content/bar.md"), "bar", None, None).unwrap();
        assert_eq!(map.get("foo").unwrap().last_url_part, "42-foo");
        assert_eq!(map.get("bar").unwrap().last_url_part, "bar");
        assert_eq!(map.url_for_pk(42).as_deref(), Some("/42-foo/"));

        let mut plain = SlugMap::new(false);
        plain.insert_content(Path::new("content/foo.md"), "foo", Some(42), None).unwrap();
        assert_eq!(plain.url_for_pk(42).as_deref(), Some("/foo/"));
        assert_eq!(plain.url_for_pk(7), None);
    }

    #[test]
    fn content_slug_colliding_with_taxonomy_fails() {
        let mut map = SlugMap::new(true);
        map.insert_taxonomy("rust", Path::new("taxonomy/rust.md")).unwrap();
        let err = map
            .insert_content(Path::new("content/rust.md"), "rust", None, None)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("taxonomy/rust.md") && msg.contains("content/rust.md"));
    }

    #[test]
    fn duplicate_pk_fails() {
        let mut map = SlugMap::new(true);
        map.insert_content(Path::new("content/a.md"), "a", Some(1), None).unwrap();
        let err = map
            .insert_content(Path::new("content/b.md"), "b", Some(1), None)
            .unwrap_err();
        assert!(matches!(err, ResolveError::DuplicatePk { pk: 1, .. }));
    }

    #[test]
    fn subsite_urls_compose() {
        let mut map = SlugMap::new(true);
        map.insert_content(Path::new("content/about.md"), "about", None, None).unwrap();
        let notes = subsite("content/notes", "about", "notes");
        map.insert_subsite(&notes.srp, &notes.config).unwrap();
        let deep = subsite("content/notes/deep", "first", "deep");
        map.insert_subsite(&deep.srp, &deep.config).unwrap();
        map.insert_content(
            Path::new("content/notes/first.md"),
            "first",
            Some(7),
            Some("notes".into()),
        )
        .unwrap();
        map.insert_content(
            Path::new("content/notes/deep/x.md"),
            "x",
            None,
            Some("deep".into()),
        )
        .unwrap();
        map.check_subsites().unwrap();

        assert_eq!(map.resolve_url_components("notes").unwrap(), ["about", "notes"]);
        assert_eq!(
            map.resolve_url_components("first").unwrap(),
            ["about", "notes", "7-first"]
        );
        assert_eq!(
            map.resolve_url_components("x").unwrap(),
            ["about", "notes", "7-first", "deep", "x"]
        );
    }

    #[test]
    fn subsite_under_taxonomy() {
        let mut map = SlugMap::new(true);
        map.insert_taxonomy("topics/rust", Path::new("taxonomy/rust.md")).unwrap();
        let s = subsite("content/rust", "topics/rust", "rust-notes");
        map.insert_subsite(&s.srp, &s.config).unwrap();
        assert_eq!(
            map.resolve_url_components("rust-notes").unwrap(),
            ["topics", "rust", "rust-notes"]
        );
    }

    #[test]
    fn subsite_problems() {
        let mut map = SlugMap::new(true);
        let orphan = subsite("content/a", "missing", "a");
        map.insert_subsite(&orphan.srp, &orphan.config).unwrap();
        assert!(matches!(map.check_subsites(), Err(ResolveError::UnknownParent { .. })));

        let mut cyclic = SlugMap::new(true);
        let x = subsite("content/x", "y", "x");
        let y = subsite("content/y", "x", "y");
        cyclic.insert_subsite(&x.srp, &x.config).unwrap();
        cyclic.insert_subsite(&y.srp, &y.config).unwrap();
        assert!(matches!(cyclic.check_subsites(), Err(ResolveError::SubsiteCycle { .. })));
    }

    #[test]
    fn index_longest_prefix() {
        let mut index = SubsiteIndex::new();
        index.insert(subsite("content/notes/deep", "first", "deep"));
        index.insert(subsite("content/notes", "about", "notes"));
        assert_eq!(index.lookup(Path::new("content/notes/a.md")).unwrap().slug(), "notes");
        assert_eq!(index.lookup(Path::new("content/notes/deep/b/c.md")).unwrap().slug(), "deep");
        assert!(index.lookup(Path::new("content/other.md")).is_none());
        let order: Vec<_> = index.iter().map(Subsite::slug).collect();
        assert_eq!(order, ["notes", "deep"]);
        assert_eq!(index.get("deep").unwrap().dir, PathBuf::from("content/notes/deep"));
    }
}
