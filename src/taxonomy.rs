//! Taxonomy graph.
//!
//! Every file under `taxonomy/` declares one node by its slug path. The
//! parent of `topics/rust/async` is always `topics/rust`; a `parent` field in
//! the document may restate that but never change it, so every node has
//! exactly one ancestor chain. A node may additionally join other nodes
//! through its own `[meta.taxonomy]` block, the same way content does.
//!
//! Building is fatal on the first violation, checked in slug-path order:
//!
//! - two files declaring the same slug path
//! - a node listing itself in its own `taxonomy` block
//! - an explicit `parent` that disagrees with the slug path
//! - a parent slug path with no file of its own
//!
//! Memberships (a node's own, and later every content document's) are
//! checked against the finished graph with [`TaxonomyGraph::check_memberships`].

use crate::metadata::{Memberships, TaxonomyMeta};
use crate::slug;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("taxonomy '{slug_path}' is declared twice: {} and {}", first.display(), second.display())]
    Duplicate {
        slug_path: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("{}: taxonomy '{slug_path}' lists itself as one of its taxonomies", srp.display())]
    SelfMembership { srp: PathBuf, slug_path: String },
    #[error("{}: parent '{declared}' contradicts the slug path '{slug_path}' (parent must be '{derived}')", srp.display())]
    ConflictingParent {
        srp: PathBuf,
        slug_path: String,
        declared: String,
        derived: String,
    },
    #[error("{}: parent taxonomy '{parent}' of '{slug_path}' does not exist", srp.display())]
    UnknownParent {
        srp: PathBuf,
        slug_path: String,
        parent: String,
    },
    #[error("{}: unknown taxonomy '{slug_path}'", srp.display())]
    UnknownMembership { srp: PathBuf, slug_path: String },
}

/// A parsed taxonomy document.
#[derive(Debug, Clone)]
pub struct TaxonomyDoc {
    pub srp: PathBuf,
    pub meta: TaxonomyMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaxonomyNode {
    pub slug_path: String,
    pub title: String,
    pub description: Option<String>,
    pub parent: Option<String>,
    /// Child slug paths, in slug-path order.
    pub children: Vec<String>,
    /// Never gets a listing page of its own.
    pub pseudo: bool,
    /// Content classified here renders as photo galleries.
    pub gallery: bool,
    /// First segment of the slug path.
    pub top_level: String,
    /// The node's own explicit memberships.
    pub taxonomy: Memberships,
    pub srp: PathBuf,
}

/// All taxonomy nodes, keyed by slug path.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyGraph {
    nodes: BTreeMap<String, TaxonomyNode>,
}

impl TaxonomyGraph {
    pub fn build(docs: Vec<TaxonomyDoc>) -> Result<Self, TaxonomyError> {
        let mut nodes: BTreeMap<String, TaxonomyNode> = BTreeMap::new();
        for doc in docs {
            let slug_path = doc.meta.slug_path;
            if let Some(existing) = nodes.get(&slug_path) {
                return Err(TaxonomyError::Duplicate {
                    slug_path,
                    first: existing.srp.clone(),
                    second: doc.srp,
                });
            }
            let node = TaxonomyNode {
                top_level: slug::top_level(&slug_path).to_string(),
                parent: slug::parent_path(&slug_path).map(str::to_string),
                slug_path: slug_path.clone(),
                title: doc.meta.title,
                description: doc.meta.description,
                children: Vec::new(),
                pseudo: doc.meta.pseudo,
                gallery: doc.meta.gallery,
                taxonomy: doc.meta.taxonomy,
                srp: doc.srp,
            };
            if let Some(declared) = doc.meta.parent
                && node.parent.as_deref() != Some(declared.as_str())
            {
                return Err(TaxonomyError::ConflictingParent {
                    srp: node.srp,
                    slug_path,
                    declared,
                    derived: node.parent.unwrap_or_default(),
                });
            }
            nodes.insert(slug_path, node);
        }

        let mut links = Vec::new();
        for node in nodes.values() {
            if node.taxonomy.contains_key(&node.slug_path) {
                return Err(TaxonomyError::SelfMembership {
                    srp: node.srp.clone(),
                    slug_path: node.slug_path.clone(),
                });
            }
            if let Some(parent) = &node.parent {
                if !nodes.contains_key(parent) {
                    return Err(TaxonomyError::UnknownParent {
                        srp: node.srp.clone(),
                        slug_path: node.slug_path.clone(),
                        parent: parent.clone(),
                    });
                }
                links.push((parent.clone(), node.slug_path.clone()));
            }
        }
        for (parent, child) in links {
            if let Some(node) = nodes.get_mut(&parent) {
                node.children.push(child);
            }
        }
        Ok(Self { nodes })
    }

    pub fn get(&self, slug_path: &str) -> Option<&TaxonomyNode> {
        self.nodes.get(slug_path)
    }

    pub fn contains(&self, slug_path: &str) -> bool {
        self.nodes.contains_key(slug_path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in slug-path order.
    pub fn iter(&self) -> impl Iterator<Item = &TaxonomyNode> {
        self.nodes.values()
    }

    pub fn children(&self, slug_path: &str) -> &[String] {
        self.nodes
            .get(slug_path)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Ancestors of a node, outermost first, excluding the node itself.
    pub fn ancestors(&self, slug_path: &str) -> Vec<&TaxonomyNode> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(slug_path).and_then(|n| n.parent.as_deref());
        while let Some(parent) = current.and_then(|p| self.nodes.get(p)) {
            chain.push(parent);
            current = parent.parent.as_deref();
        }
        chain.reverse();
        chain
    }

    pub fn top_level_of(&self, slug_path: &str) -> Option<&TaxonomyNode> {
        self.nodes
            .get(slug_path)
            .and_then(|n| self.nodes.get(&n.top_level))
    }

    /// Fails on the first membership naming a node that does not exist.
    pub fn check_memberships(
        &self,
        srp: &std::path::Path,
        memberships: &Memberships,
    ) -> Result<(), TaxonomyError> {
        match memberships.keys().find(|slug_path| !self.contains(slug_path)) {
            Some(slug_path) => Err(TaxonomyError::UnknownMembership {
                srp: srp.to_path_buf(),
                slug_path: slug_path.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Checks every node's own memberships.
    pub fn check_node_memberships(&self) -> Result<(), TaxonomyError> {
        self.nodes
            .values()
            .try_for_each(|node| self.check_memberships(&node.srp, &node.taxonomy))
    }

    /// Whether any node among the memberships renders as a gallery.
    pub fn in_gallery(&self, memberships: &Memberships) -> bool {
        memberships
            .keys()
            .any(|slug_path| self.get(slug_path).is_some_and(|n| n.gallery))
    }

    /// Depth-first: does this node or any descendant satisfy `has_content`?
    pub fn has_deep_content(&self, slug_path: &str, has_content: &dyn Fn(&str) -> bool) -> bool {
        let mut stack = vec![slug_path];
        while let Some(current) = stack.pop() {
            if has_content(current) {
                return true;
            }
            stack.extend(self.children(current).iter().map(String::as_str));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn doc(slug_path: &str) -> TaxonomyDoc {
        TaxonomyDoc {
            srp: PathBuf::from(format!("taxonomy/{}.md", slug_path.replace('/', "-"))),
            meta: TaxonomyMeta {
                slug_path: slug_path.to_string(),
                title: slug::leaf(slug_path).to_uppercase(),
                ..TaxonomyMeta::default()
            },
        }
    }

    fn graph(paths: &[&str]) -> TaxonomyGraph {
        TaxonomyGraph::build(paths.iter().map(|p| doc(p)).collect()).unwrap()
    }

    #[test]
    fn derives_parents_and_children() {
        let g = graph(&["topics", "topics/rust", "topics/go", "topics/rust/async"]);
        assert_eq!(g.len(), 4);
        assert_eq!(g.get("topics/rust").unwrap().parent.as_deref(), Some("topics"));
        assert_eq!(g.children("topics"), ["topics/go", "topics/rust"]);
        assert_eq!(g.children("topics/rust"), ["topics/rust/async"]);
        assert_eq!(g.get("topics/rust/async").unwrap().top_level, "topics");
        assert_eq!(g.top_level_of("topics/rust/async").unwrap().slug_path, "topics");
    }

    #[test]
    fn ancestors_outermost_first() {
        let g = graph(&["a", "a/b", "a/b/c"]);
        let chain: Vec<_> = g.ancestors("a/b/c").iter().map(|n| n.slug_path.as_str()).collect();
        assert_eq!(chain, ["a", "a/b"]);
        assert!(g.ancestors("a").is_empty());
    }

    #[test]
    fn duplicate_slug_path_names_both_files() {
        let mut second = doc("topics");
        second.srp = PathBuf::from("taxonomy/other.md");
        let err = TaxonomyGraph::build(vec![doc("topics"), second]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("taxonomy/topics.md"));
        assert!(msg.contains("taxonomy/other.md"));
    }

    #[test]
    fn missing_parent_fails() {
        let err = TaxonomyGraph::build(vec![doc("topics/rust")]).unwrap_err();
        assert!(matches!(err, TaxonomyError::UnknownParent { parent, .. } if parent == "topics"));
    }

    #[test]
    fn self_membership_fails() {
        let mut d = doc("topics");
        d.meta.taxonomy.insert("topics".into(), None);
        assert!(matches!(
            TaxonomyGraph::build(vec![d]),
            Err(TaxonomyError::SelfMembership { .. })
        ));
    }

    #[test]
    fn explicit_parent_must_match_prefix() {
        let mut ok = doc("topics/rust");
        ok.meta.parent = Some("topics".into());
        assert!(TaxonomyGraph::build(vec![doc("topics"), ok]).is_ok());

        let mut bad = doc("topics/rust");
        bad.meta.parent = Some("languages".into());
        assert!(matches!(
            TaxonomyGraph::build(vec![doc("topics"), doc("languages"), bad]),
            Err(TaxonomyError::ConflictingParent { .. })
        ));
    }

    #[test]
    fn membership_checks() {
        let mut tagged = doc("types");
        tagged.meta.taxonomy.insert("topics".into(), None);
        let g = TaxonomyGraph::build(vec![doc("topics"), tagged]).unwrap();
        g.check_node_memberships().unwrap();

        let mut memberships = Memberships::new();
        memberships.insert("topics".into(), Some(1));
        g.check_memberships(Path::new("content/a.md"), &memberships).unwrap();
        memberships.insert("nope".into(), None);
        let err = g
            .check_memberships(Path::new("content/a.md"), &memberships)
            .unwrap_err();
        assert!(err.to_string().contains("content/a.md"));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn gallery_and_deep_content() {
        let mut photos = doc("photos");
        photos.meta.gallery = true;
        let g = TaxonomyGraph::build(vec![photos, doc("a"), doc("a/b"), doc("a/b/c"), doc("a/d")])
            .unwrap();

        let mut memberships = Memberships::new();
        memberships.insert("a".into(), None);
        assert!(!g.in_gallery(&memberships));
        memberships.insert("photos".into(), None);
        assert!(g.in_gallery(&memberships));

        let has = |s: &str| s == "a/b/c";
        assert!(g.has_deep_content("a", &has));
        assert!(g.has_deep_content("a/b", &has));
        assert!(!g.has_deep_content("a/d", &has));
    }
}
