//! Routable units.
//!
//! Every url the build produces is an [`Endpoint`] in one [`Endpoints`]
//! arena, addressed by [`EndpointId`]. Endpoints refer to each other
//! (redirect targets, `prev`/`next`, paginator pages) by id, and are only
//! mutated to attach navigation once constructed.
//!
//! ## Url rules
//!
//! | Components | Page | Url |
//! |---|---|---|
//! | `[]` | none or 0 | `/` |
//! | `["topics", "rust"]` | 0 | `/topics/rust/` |
//! | `["topics", "rust"]` | 2 | `/topics/rust/page/3/` |
//! | `["sitemap.xml"]` | none | `/sitemap.xml` |

use crate::metadata::{Memberships, PhotoMeta};
use crate::paginator::PaginatorPage;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

/// Url segment introducing a listing page number.
pub const PAGE_SEGMENT: &str = "page";

/// Index of a content document in the build's document list.
pub type DocId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointId(usize);

impl EndpointId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EndpointKind {
    /// Site or subsite home listing.
    Home,
    /// A content document, or the root of a gallery.
    Content(DocId),
    Taxonomy(String),
    /// One photo of a gallery document.
    GalleryItem {
        gallery: DocId,
        /// Image path relative to the gallery document's directory.
        image: String,
        url: String,
        original_url: String,
        thumbnail_url: String,
        photo: Option<PhotoMeta>,
    },
    DateArchive {
        year: Option<i32>,
        month: Option<u32>,
    },
    Redirect(EndpointId),
    /// Static asset copied from `source`.
    Static(PathBuf),
    /// Resized or original image copied from `source`.
    CachedImage(PathBuf),
    NotFound,
    Rss,
    Sitemap,
}

/// What listings, sorting and filtering need to know about an endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub title: String,
    pub date: Option<NaiveDateTime>,
    pub taxonomies: Memberships,
    /// Source file, when the endpoint has one.
    pub srp: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub components: Vec<String>,
    /// 0-based listing page.
    pub page: Option<usize>,
    pub kind: EndpointKind,
    /// Slug of the subsite the endpoint belongs to.
    pub subsite: Option<String>,
    /// Template name, including any subsite prefix.
    pub template: Option<String>,
    pub listing: Listing,
    pub prev: Option<EndpointId>,
    pub next: Option<EndpointId>,
    pub paginator_page: Option<PaginatorPage>,
}

impl Endpoint {
    pub fn new(components: Vec<String>, kind: EndpointKind) -> Self {
        Self {
            components,
            page: None,
            kind,
            subsite: None,
            template: None,
            listing: Listing::default(),
            prev: None,
            next: None,
            paginator_page: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_listing(mut self, listing: Listing) -> Self {
        self.listing = listing;
        self
    }

    pub fn with_subsite(mut self, subsite: Option<String>) -> Self {
        self.subsite = subsite;
        self
    }

    pub fn url(&self) -> String {
        format_url(&self.components, self.page)
    }

    /// Where the rendered output lands, relative to the publish root.
    pub fn output_path(&self) -> PathBuf {
        let url = self.url();
        let rel = url.trim_start_matches('/');
        if url.ends_with('/') {
            Path::new(rel).join("index.html")
        } else {
            PathBuf::from(rel)
        }
    }

    pub fn is_content(&self) -> bool {
        matches!(self.kind, EndpointKind::Content(_))
    }

    pub fn is_taxonomy(&self) -> bool {
        matches!(self.kind, EndpointKind::Taxonomy(_))
    }

    /// Whether the endpoint is copied rather than rendered.
    pub fn is_asset(&self) -> bool {
        matches!(
            self.kind,
            EndpointKind::Static(_) | EndpointKind::CachedImage(_)
        )
    }

    /// Home, content and taxonomy pages. Gallery items, date archives,
    /// redirects and assets stay out of the sitemap.
    pub fn add_to_sitemap(&self) -> bool {
        matches!(
            self.kind,
            EndpointKind::Home | EndpointKind::Content(_) | EndpointKind::Taxonomy(_)
        )
    }
}

/// Url of a component list plus optional 0-based page.
pub fn format_url(components: &[String], page: Option<usize>) -> String {
    let mut parts: Vec<&str> = components.iter().map(String::as_str).collect();
    let page_number;
    if let Some(page) = page.filter(|p| *p > 0) {
        page_number = (page + 1).to_string();
        parts.push(PAGE_SEGMENT);
        parts.push(&page_number);
    }
    let Some(last) = parts.last() else {
        return "/".to_string();
    };
    let joined = parts.join("/");
    if Path::new(last).extension().is_some() {
        format!("/{joined}")
    } else {
        format!("/{joined}/")
    }
}

/// Arena of every endpoint created during a build.
#[derive(Debug, Clone, Default)]
pub struct Endpoints {
    items: Vec<Endpoint>,
}

impl Endpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, endpoint: Endpoint) -> EndpointId {
        self.items.push(endpoint);
        EndpointId(self.items.len() - 1)
    }

    pub fn get(&self, id: EndpointId) -> &Endpoint {
        &self.items[id.0]
    }

    pub fn get_mut(&mut self, id: EndpointId) -> &mut Endpoint {
        &mut self.items[id.0]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Name used in error messages: the source file, the redirect target's
    /// identifier, or the url.
    pub fn identifier(&self, id: EndpointId) -> String {
        let mut endpoint = self.get(id);
        // Redirect chains are one hop; the bound keeps a bad chain finite.
        for _ in 0..self.items.len() {
            match &endpoint.listing.srp {
                Some(srp) => return srp.display().to_string(),
                None => match endpoint.kind {
                    EndpointKind::Redirect(target) => endpoint = self.get(target),
                    _ => break,
                },
            }
        }
        endpoint.url()
    }

    /// Next listing page of `id`: same kind and components, page + 1.
    pub fn next_page(&mut self, id: EndpointId) -> EndpointId {
        let current = self.get(id);
        let mut next = Endpoint {
            prev: None,
            next: None,
            paginator_page: None,
            ..current.clone()
        };
        next.page = Some(current.page.unwrap_or(0) + 1);
        self.push(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn url_rules() {
        assert_eq!(format_url(&[], None), "/");
        assert_eq!(format_url(&[], Some(0)), "/");
        assert_eq!(format_url(&[], Some(1)), "/page/2/");
        assert_eq!(format_url(&parts(&["foo"]), None), "/foo/");
        assert_eq!(format_url(&parts(&["a", "b"]), Some(0)), "/a/b/");
        assert_eq!(format_url(&parts(&["a", "b"]), Some(2)), "/a/b/page/3/");
        assert_eq!(format_url(&parts(&["sitemap.xml"]), None), "/sitemap.xml");
        assert_eq!(
            format_url(&parts(&["_static", "css", "site_ab12.css"]), None),
            "/_static/css/site_ab12.css"
        );
    }

    #[test]
    fn output_paths() {
        let page = Endpoint::new(parts(&["notes", "first"]), EndpointKind::Home);
        assert_eq!(page.output_path(), PathBuf::from("notes/first/index.html"));
        let home = Endpoint::new(vec![], EndpointKind::Home);
        assert_eq!(home.output_path(), PathBuf::from("index.html"));
        let feed = Endpoint::new(parts(&["index.xml"]), EndpointKind::Rss);
        assert_eq!(feed.output_path(), PathBuf::from("index.xml"));
    }

    #[test]
    fn identifiers() {
        let mut endpoints = Endpoints::new();
        let doc = endpoints.push(
            Endpoint::new(parts(&["foo"]), EndpointKind::Content(0)).with_listing(Listing {
                srp: Some(PathBuf::from("content/foo.md")),
                ..Listing::default()
            }),
        );
        let redirect = endpoints.push(Endpoint::new(parts(&["42"]), EndpointKind::Redirect(doc)));
        let fixed = endpoints.push(Endpoint::new(parts(&["404.html"]), EndpointKind::NotFound));
        assert_eq!(endpoints.identifier(doc), "content/foo.md");
        assert_eq!(endpoints.identifier(redirect), "content/foo.md");
        assert_eq!(endpoints.identifier(fixed), "/404.html");
    }

    #[test]
    fn next_page_shares_kind_and_components() {
        let mut endpoints = Endpoints::new();
        let base = endpoints.push(
            Endpoint::new(parts(&["topics"]), EndpointKind::Taxonomy("topics".into()))
                .with_template("pages/taxonomy.html"),
        );
        let second = endpoints.next_page(base);
        let third = endpoints.next_page(second);
        assert_eq!(endpoints.get(second).url(), "/topics/page/2/");
        assert_eq!(endpoints.get(third).url(), "/topics/page/3/");
        assert_eq!(endpoints.get(third).kind, EndpointKind::Taxonomy("topics".into()));
        assert_eq!(
            endpoints.get(third).template.as_deref(),
            Some("pages/taxonomy.html")
        );
    }

    #[test]
    fn sitemap_eligibility() {
        assert!(Endpoint::new(vec![], EndpointKind::Home).add_to_sitemap());
        assert!(!Endpoint::new(vec![], EndpointKind::Rss).add_to_sitemap());
        assert!(
            !Endpoint::new(vec![], EndpointKind::Redirect(EndpointId(0))).add_to_sitemap()
        );
        assert!(Endpoint::new(vec!["a".into()], EndpointKind::Content(0)).add_to_sitemap());
        let archive = EndpointKind::DateArchive {
            year: Some(2024),
            month: None,
        };
        assert!(!Endpoint::new(vec!["archive".into(), "2024".into()], archive).add_to_sitemap());
    }
}
