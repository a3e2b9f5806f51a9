//! Build orchestration.
//!
//! [`Router::build`] turns a site directory into a [`Site`]: every url the
//! site will serve, registered exactly once in [`Routes`], plus everything
//! publishing needs to render them. The build runs in fixed phases, each
//! complete before the next starts, and stops at the first error:
//!
//! | # | Phase | Fails on |
//! |---|---|---|
//! | 1 | taxonomy scan (meta only) | duplicate slug path, bad parent |
//! | 2 | taxonomy cross-check | unknown node in a node's own memberships |
//! | 3 | subsite discovery | unreadable or invalid subsite config |
//! | 4 | PK pre-pass (meta only) | slug or PK used twice |
//! | 5 | subsite validation | unknown parent slug, slug collision, cycle |
//! | 6 | full content build | render errors, gallery rules, missing template or field |
//! | 7 | content membership check | unknown taxonomy |
//! | 8 | taxonomy listings | series gap or repeated part |
//! | 9 | date archives | |
//! | 10 | home listings | |
//! | 11 | `404.html`, `index.xml`, `sitemap.xml` | |
//! | 12 | static and image routes | |
//!
//! Every phase from 6 on can also fail with a url collision, reported with
//! the source files of both endpoints. Publishing is the thirteenth phase,
//! see [`crate::generate::publish`].
//!
//! Every listing (home, taxonomy, archive, gallery) is paginated the same
//! way: `/x/`, `/x/page/2/`, ... plus redirects from `/x/page/1/` and
//! `/x/page/` back to `/x/`.

use crate::cache::{CacheError, ConfigBucket, Wisdom};
use crate::config::{self, CONFIG_FILENAME, ConfigError, SiteConfig, SubsiteConfig};
use crate::endpoint::{
    DocId, Endpoint, EndpointId, EndpointKind, Endpoints, Listing, PAGE_SEGMENT,
};
use crate::metadata::{ContentMeta, MetaError, TaxonomyMeta};
use crate::paginator::Paginator;
use crate::resolver::{ResolveError, SlugMap, Subsite, SubsiteIndex};
use crate::scan::{self, ScanError, SiteFiles};
use crate::source::{
    DocKind, DocumentSource, ImageUrls, Registry, RenderResult, SUMMARY_COLLECTOR,
};
use crate::store::{PageStore, StoreError};
use crate::taxonomy::{TaxonomyDoc, TaxonomyError, TaxonomyGraph};
use crate::theme::{self, TemplateRenderer};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Url prefix of static assets.
pub const STATIC_URL: &str = "_static";

/// Gallery listing page size when the document does not set one.
pub const DEFAULT_GALLERY_PER_PAGE: usize = 50;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("url conflict for '{url}': {first} and {second}")]
    Collision {
        url: String,
        first: String,
        second: String,
    },
    #[error("{}: {message}", srp.display())]
    Gallery { srp: PathBuf, message: String },
    #[error("{}: template '{template}' does not exist", srp.display())]
    MissingTemplate { srp: PathBuf, template: String },
    #[error("{}: '{field}' is required for content classified under '{taxonomy}'", srp.display())]
    MissingField {
        srp: PathBuf,
        field: String,
        taxonomy: String,
    },
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Meta(#[from] MetaError),
    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Route(#[from] RouteError),
}

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Reuse the `_wisdom` cache from earlier builds.
    pub use_cache: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

/// The route table: final url -> endpoint, in url order.
#[derive(Debug, Clone, Default)]
pub struct Routes {
    by_url: BTreeMap<String, EndpointId>,
}

impl Routes {
    /// Register `id` under its url. A url can only be registered once.
    pub fn add_route(&mut self, endpoints: &Endpoints, id: EndpointId) -> Result<(), RouteError> {
        let url = endpoints.get(id).url();
        if let Some(&existing) = self.by_url.get(&url) {
            return Err(RouteError::Collision {
                url,
                first: endpoints.identifier(existing),
                second: endpoints.identifier(id),
            });
        }
        self.by_url.insert(url, id);
        Ok(())
    }

    pub fn get(&self, url: &str) -> Option<EndpointId> {
        self.by_url.get(url).copied()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.by_url.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, EndpointId)> {
        self.by_url.iter().map(|(url, id)| (url.as_str(), *id))
    }
}

/// A fully rendered content document.
#[derive(Debug, Clone)]
pub struct ContentDoc {
    pub srp: PathBuf,
    pub meta: ContentMeta,
    pub body: String,
    pub result: RenderResult,
    /// Slug of the enclosing subsite.
    pub subsite: Option<String>,
    pub endpoint: EndpointId,
    /// Gallery item endpoints, in image order. Empty for plain documents.
    pub gallery: Vec<EndpointId>,
    /// The `img` image at the default size.
    pub image: Option<ImageUrls>,
}

impl ContentDoc {
    /// Rendered summary: `meta.summary`, else the inline summary.
    pub fn summary(&self) -> Option<String> {
        self.meta.summary_content.clone().or_else(|| {
            let inline = self.result.collected(SUMMARY_COLLECTOR);
            (!inline.is_empty()).then(|| inline.concat())
        })
    }

    pub fn is_gallery(&self) -> bool {
        !self.gallery.is_empty()
    }
}

/// A built site, ready to publish.
#[derive(Debug)]
pub struct Site {
    pub root: PathBuf,
    pub config: SiteConfig,
    pub wisdom: Wisdom,
    pub taxonomy: TaxonomyGraph,
    pub slugs: SlugMap,
    pub subsites: SubsiteIndex,
    pub docs: Vec<ContentDoc>,
    /// Rendered bodies of taxonomy nodes that got a listing.
    pub taxonomy_bodies: BTreeMap<String, String>,
    pub endpoints: Endpoints,
    pub routes: Routes,
    /// Urls of the theme's stylesheets, fingerprinted.
    pub stylesheets: Vec<String>,
    /// RSS entries, newest first.
    pub feed: Vec<EndpointId>,
}

impl Site {
    pub fn doc(&self, id: DocId) -> &ContentDoc {
        &self.docs[id]
    }

    pub fn url_of(&self, id: EndpointId) -> String {
        self.endpoints.get(id).url()
    }
}

/// Content of one site or subsite, split by whether documents have a PK.
#[derive(Debug, Default)]
struct SiteStores {
    with_pk: PageStore,
    without_pk: PageStore,
}

impl SiteStores {
    fn combined(&self) -> PageStore {
        self.with_pk.concat(&self.without_pk)
    }
}

pub struct Router<'a> {
    source: &'a dyn DocumentSource,
    templates: &'a dyn TemplateRenderer,
    registry: Registry,
    files: SiteFiles,
    /// Keyed by subsite slug; `None` is the main site.
    stores: BTreeMap<Option<String>, SiteStores>,
    site: Site,
}

impl<'a> Router<'a> {
    /// Run build phases 1 to 12 for the site at `root`.
    pub fn build(
        root: &Path,
        options: &BuildOptions,
        source: &'a dyn DocumentSource,
        templates: &'a dyn TemplateRenderer,
    ) -> Result<Site, BuildError> {
        let files = scan::scan(root)?;
        let mut wisdom = Wisdom::open(root, options.use_cache);
        let config = load_config(root, &mut wisdom)?;
        wisdom.set_default_image_size(config.images.default_size);
        info!(
            documents = files.content.len(),
            taxonomies = files.taxonomy.len(),
            "scanned {}",
            root.display()
        );

        let mut router = Router {
            source,
            templates,
            registry: Registry::standard(),
            files,
            stores: BTreeMap::new(),
            site: Site {
                root: root.to_path_buf(),
                slugs: SlugMap::new(config.pk_in_url),
                config,
                wisdom,
                taxonomy: TaxonomyGraph::default(),
                subsites: SubsiteIndex::new(),
                docs: Vec::new(),
                taxonomy_bodies: BTreeMap::new(),
                endpoints: Endpoints::new(),
                routes: Routes::default(),
                stylesheets: Vec::new(),
                feed: Vec::new(),
            },
        };
        router.scan_taxonomy()?;
        router.site.taxonomy.check_node_memberships()?;
        router.discover_subsites()?;
        router.prepopulate_slugs()?;
        router.validate_subsites()?;
        router.build_content()?;
        router.check_content_memberships()?;
        router.taxonomy_routes()?;
        router.date_archive_routes()?;
        router.home_routes()?;
        router.fixed_routes()?;
        router.asset_routes()?;
        info!(routes = router.site.routes.len(), "routes complete");
        Ok(router.site)
    }

    // =========================================================================
    // Phases 1-5: taxonomy, subsites, slugs
    // =========================================================================

    fn scan_taxonomy(&mut self) -> Result<(), BuildError> {
        let mut docs = Vec::with_capacity(self.files.taxonomy.len());
        for srp in &self.files.taxonomy {
            let result =
                self.site
                    .wisdom
                    .get_meta(srp, DocKind::Taxonomy, self.source, &self.registry)?;
            docs.push(TaxonomyDoc {
                srp: srp.clone(),
                meta: TaxonomyMeta::from_context(srp, &result.context)?,
            });
        }
        self.site.taxonomy = TaxonomyGraph::build(docs)?;
        info!(nodes = self.site.taxonomy.len(), "taxonomy graph built");
        Ok(())
    }

    fn discover_subsites(&mut self) -> Result<(), BuildError> {
        for srp in &self.files.subsite_configs {
            let config: SubsiteConfig = self.site.wisdom.get_config(
                ConfigBucket::Subsite,
                srp,
                config::load_subsite_config,
            )?;
            let dir = srp.parent().unwrap_or(Path::new("")).to_path_buf();
            debug!(subsite = %config.subsite_slug, dir = %dir.display(), "subsite");
            self.site.subsites.insert(Subsite {
                srp: srp.clone(),
                dir,
                config,
            });
        }
        Ok(())
    }

    /// Learn every slug and PK before anything renders, so that a document
    /// can link to any PK.
    fn prepopulate_slugs(&mut self) -> Result<(), BuildError> {
        for node in self.site.taxonomy.iter() {
            self.site.slugs.insert_taxonomy(&node.slug_path, &node.srp)?;
        }
        for srp in &self.files.content {
            let result =
                self.site
                    .wisdom
                    .get_meta(srp, DocKind::Content, self.source, &self.registry)?;
            let meta = ContentMeta::from_result(srp, &result)?;
            let subsite = self.site.subsites.lookup(srp).map(|s| s.slug().to_string());
            self.site
                .slugs
                .insert_content(srp, &meta.slug, meta.pk, subsite)?;
        }
        info!(pks = self.site.slugs.pk_count(), "slug map built");
        Ok(())
    }

    fn validate_subsites(&mut self) -> Result<(), BuildError> {
        for subsite in self.site.subsites.iter() {
            self.site.slugs.insert_subsite(&subsite.srp, &subsite.config)?;
        }
        self.site.slugs.check_subsites()?;
        Ok(())
    }

    // =========================================================================
    // Phases 6-7: content
    // =========================================================================

    fn build_content(&mut self) -> Result<(), BuildError> {
        let content = std::mem::take(&mut self.files.content);
        for srp in &content {
            self.build_document(srp)?;
        }
        for (subsite, stores) in &self.stores {
            let nav = match subsite {
                None => stores.with_pk.clone(),
                Some(_) => stores.combined(),
            };
            nav.annotate_nav(&mut self.site.endpoints, true);
        }
        info!(
            documents = self.site.docs.len(),
            cache = %self.site.wisdom.stats,
            "content rendered"
        );
        Ok(())
    }

    fn build_document(&mut self, srp: &Path) -> Result<(), BuildError> {
        let (body, result) = {
            let slugs = &self.site.slugs;
            let links = |pk: u64| slugs.url_for_pk(pk);
            self.site.wisdom.get_or_render(
                srp,
                DocKind::Content,
                self.source,
                &self.registry,
                &links,
            )?
        };
        let meta = ContentMeta::from_result(srp, &result)?;
        self.check_required_fields(srp, &meta)?;

        let subsite = self.site.subsites.lookup(srp).map(|s| s.slug().to_string());
        let template = self.template_for(
            subsite.as_deref(),
            meta.use_template.as_deref().unwrap_or(theme::CONTENT),
        );
        if !self.templates.has_template(&template) {
            return Err(RouteError::MissingTemplate {
                srp: srp.to_path_buf(),
                template,
            }
            .into());
        }

        let doc_id = self.site.docs.len();
        let components = self.site.slugs.resolve_url_components(&meta.slug)?;
        let id = self.site.endpoints.push(
            Endpoint::new(components, EndpointKind::Content(doc_id))
                .with_template(template)
                .with_subsite(subsite.clone())
                .with_listing(Listing {
                    title: meta.display_title().to_string(),
                    date: meta.date,
                    taxonomies: meta.taxonomy.clone(),
                    srp: Some(srp.to_path_buf()),
                }),
        );

        let gallery = if self.site.taxonomy.in_gallery(&meta.taxonomy) {
            self.build_gallery(srp, &meta, doc_id, id)?
        } else {
            self.add_route(id)?;
            Vec::new()
        };
        let image = match meta.img.as_deref() {
            Some(img) => {
                let [w, h] = self.site.config.images.default_size;
                Some(self.site.wisdom.get_or_create_image(srp, img, w, h, true)?)
            }
            None => None,
        };

        if let Some(pk) = meta.pk {
            let redirect = self.site.endpoints.push(
                Endpoint::new(vec![pk.to_string()], EndpointKind::Redirect(id))
                    .with_template(theme::REDIRECT),
            );
            self.add_route(redirect)?;
        }

        let stores = self.stores.entry(subsite.clone()).or_default();
        if meta.pk.is_some() {
            stores.with_pk.add(id);
        } else {
            stores.without_pk.add(id);
        }
        self.site.docs.push(ContentDoc {
            srp: srp.to_path_buf(),
            meta,
            body,
            result,
            subsite,
            endpoint: id,
            gallery,
            image,
        });
        Ok(())
    }

    /// One item endpoint per image below the document's directory, each
    /// with a display-size and a thumbnail-size variant.
    fn build_gallery(
        &mut self,
        srp: &Path,
        meta: &ContentMeta,
        doc_id: DocId,
        root: EndpointId,
    ) -> Result<Vec<EndpointId>, BuildError> {
        let gallery_error = |message: &str| RouteError::Gallery {
            srp: srp.to_path_buf(),
            message: message.to_string(),
        };
        if meta.img.is_some() {
            return Err(gallery_error("meta.img is not allowed on gallery content").into());
        }
        let gallery = meta.gallery.clone().unwrap_or_default();
        if gallery.images.iter().filter(|p| p.cover).count() > 1 {
            return Err(gallery_error("more than one gallery image is marked as cover").into());
        }

        let [display_w, display_h] = self.site.config.images.gallery_size;
        let [thumb_w, thumb_h] = self.site.config.images.thumbnail_size;
        let components = self.site.endpoints.get(root).components.clone();
        let doc_dir = srp.parent().unwrap_or(Path::new(""));

        let mut items: Vec<EndpointId> = Vec::new();
        for (index, image) in scan::gallery_images(&self.site.root, srp)?
            .into_iter()
            .enumerate()
        {
            let display =
                self.site
                    .wisdom
                    .get_or_create_image(srp, &image, display_w, display_h, true)?;
            let thumb = self
                .site
                .wisdom
                .get_or_create_image(srp, &image, thumb_w, thumb_h, false)?;
            let photo = gallery.photo(&image).cloned();
            let title = photo
                .as_ref()
                .and_then(|p| p.title.clone())
                .unwrap_or_else(|| image.clone());

            let mut item_components = components.clone();
            item_components.push((index + 1).to_string());
            let id = self.site.endpoints.push(
                Endpoint::new(
                    item_components,
                    EndpointKind::GalleryItem {
                        gallery: doc_id,
                        image: image.clone(),
                        url: display.url,
                        original_url: display.original_url,
                        thumbnail_url: thumb.url,
                        photo,
                    },
                )
                .with_template(theme::GALLERY_ITEM)
                .with_listing(Listing {
                    title,
                    srp: Some(doc_dir.join(&image)),
                    ..Listing::default()
                }),
            );
            if let Some(&prev) = items.last() {
                self.site.endpoints.get_mut(prev).next = Some(id);
                self.site.endpoints.get_mut(id).prev = Some(prev);
            }
            self.add_route(id)?;
            items.push(id);
        }

        let per_page = gallery.per_page.unwrap_or(DEFAULT_GALLERY_PER_PAGE);
        debug!(srp = %srp.display(), images = items.len(), "gallery");
        self.paginate(root, items.clone(), per_page)?;
        Ok(items)
    }

    /// `required_fields` applies to content in the named taxonomy or any
    /// node below it.
    fn check_required_fields(&self, srp: &Path, meta: &ContentMeta) -> Result<(), RouteError> {
        for (taxonomy, fields) in &self.site.config.required_fields {
            let classified = meta.taxonomy.keys().any(|slug_path| {
                slug_path == taxonomy
                    || slug_path
                        .strip_prefix(taxonomy.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            });
            if !classified {
                continue;
            }
            if let Some(field) = fields.iter().find(|f| !meta.has_field(f)) {
                return Err(RouteError::MissingField {
                    srp: srp.to_path_buf(),
                    field: field.clone(),
                    taxonomy: taxonomy.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_content_memberships(&self) -> Result<(), BuildError> {
        for doc in &self.site.docs {
            self.site
                .taxonomy
                .check_memberships(&doc.srp, &doc.meta.taxonomy)?;
        }
        Ok(())
    }

    // =========================================================================
    // Phases 8-10: listings
    // =========================================================================

    fn taxonomy_routes(&mut self) -> Result<(), BuildError> {
        let mut all = PageStore::new();
        for stores in self.stores.values() {
            all.extend(stores.combined().iter());
        }

        let mut node_endpoints: BTreeMap<String, EndpointId> = BTreeMap::new();
        for node in self.site.taxonomy.iter() {
            let mut taxonomies = node.taxonomy.clone();
            if let Some(parent) = &node.parent {
                taxonomies.entry(parent.clone()).or_insert(None);
            }
            let id = self.site.endpoints.push(
                Endpoint::new(
                    node.slug_path.split('/').map(str::to_string).collect(),
                    EndpointKind::Taxonomy(node.slug_path.clone()),
                )
                .with_template(theme::TAXONOMY)
                .with_listing(Listing {
                    title: node.title.clone(),
                    date: None,
                    taxonomies,
                    srp: Some(node.srp.clone()),
                }),
            );
            node_endpoints.insert(node.slug_path.clone(), id);
            if !node.pseudo {
                all.add(id);
            }
        }

        let mut members: BTreeMap<String, PageStore> = BTreeMap::new();
        for slug_path in node_endpoints.keys() {
            members.insert(
                slug_path.clone(),
                all.filter_by_topic(&self.site.endpoints, slug_path)?,
            );
        }

        // Nodes with no content anywhere below them.
        let barren: BTreeSet<String> = {
            let endpoints = &self.site.endpoints;
            let has_pages = |slug_path: &str| {
                members
                    .get(slug_path)
                    .is_some_and(|m| !m.exclude_taxonomies(endpoints).is_empty())
            };
            self.site
                .taxonomy
                .iter()
                .filter(|n| !self.site.taxonomy.has_deep_content(&n.slug_path, &has_pages))
                .map(|n| n.slug_path.clone())
                .collect()
        };

        for (slug_path, store) in members.iter_mut() {
            let Some(node) = self.site.taxonomy.get(slug_path) else {
                continue;
            };
            for child in node.children.iter().filter(|c| barren.contains(*c)) {
                if let Some(&child_id) = node_endpoints.get(child) {
                    store.remove(child_id);
                }
            }
        }
        let routed = self.routed_taxonomies(&members, &node_endpoints);

        let per_page = self.site.config.per_page;
        let nodes: Vec<_> = self
            .site
            .taxonomy
            .iter()
            .map(|n| (n.slug_path.clone(), n.pseudo, n.srp.clone()))
            .collect();
        let mut listed = 0;
        for (slug_path, pseudo, srp) in nodes {
            let Some(&id) = node_endpoints.get(&slug_path) else {
                continue;
            };
            let mut store = members.remove(&slug_path).unwrap_or_default();
            for &other in node_endpoints.values() {
                if !routed.contains(&other) {
                    store.remove(other);
                }
            }
            let sorted = store.list_view_sort(&self.site.endpoints, &slug_path)?;
            if pseudo || sorted.is_empty() {
                debug!(taxonomy = %slug_path, pseudo, "no listing");
                continue;
            }

            let (body, _) = {
                let slugs = &self.site.slugs;
                let links = |pk: u64| slugs.url_for_pk(pk);
                self.site.wisdom.get_or_render(
                    &srp,
                    DocKind::Taxonomy,
                    self.source,
                    &self.registry,
                    &links,
                )?
            };
            self.site.taxonomy_bodies.insert(slug_path, body);
            self.paginate(id, sorted.to_vec(), per_page)?;
            listed += 1;
        }
        info!(listed, "taxonomy listings");
        Ok(())
    }

    /// Taxonomy endpoints that end up with a listing: not pseudo, and with
    /// at least one member that is content or another listed node. Dropping
    /// a node can empty the nodes listing it, so this runs to a fixed point.
    fn routed_taxonomies(
        &self,
        members: &BTreeMap<String, PageStore>,
        node_endpoints: &BTreeMap<String, EndpointId>,
    ) -> BTreeSet<EndpointId> {
        let taxonomy_ids: BTreeSet<EndpointId> = node_endpoints.values().copied().collect();
        let mut routed: BTreeSet<EndpointId> = node_endpoints
            .iter()
            .filter(|(slug_path, _)| {
                self.site
                    .taxonomy
                    .get(slug_path)
                    .is_some_and(|node| !node.pseudo)
            })
            .map(|(_, &id)| id)
            .collect();
        loop {
            let dropped: Vec<EndpointId> = node_endpoints
                .iter()
                .filter(|(_, id)| routed.contains(*id))
                .filter(|(slug_path, _)| {
                    members.get(*slug_path).is_none_or(|store| {
                        !store
                            .iter()
                            .any(|m| !taxonomy_ids.contains(&m) || routed.contains(&m))
                    })
                })
                .map(|(_, &id)| id)
                .collect();
            if dropped.is_empty() {
                return routed;
            }
            for id in dropped {
                routed.remove(&id);
            }
        }
    }

    /// Month listings hold documents oldest first; a year lists its months
    /// and the archive root lists the years.
    fn date_archive_routes(&mut self) -> Result<(), BuildError> {
        let Some(archive) = self.site.config.date_archive_url.clone() else {
            return Ok(());
        };
        let per_page = self.site.config.per_page;
        let main = self
            .stores
            .get(&None)
            .map(SiteStores::combined)
            .unwrap_or_default();
        let groups = main
            .only_dated(&self.site.endpoints)
            .group_by_date(&self.site.endpoints);

        let root = self.push_archive(vec![archive.clone()], None, None);
        let mut years: Vec<(i32, EndpointId, Vec<EndpointId>)> = Vec::new();
        for ((year, month), store) in groups {
            let month_id = self.push_archive(
                vec![archive.clone(), year.to_string(), month.to_string()],
                Some(year),
                Some(month),
            );
            let items = store.order_by_date(&self.site.endpoints, false).to_vec();
            self.paginate(month_id, items, per_page)?;

            if !years.last().is_some_and(|(y, _, _)| *y == year) {
                let year_id =
                    self.push_archive(vec![archive.clone(), year.to_string()], Some(year), None);
                years.push((year, year_id, Vec::new()));
            }
            if let Some((_, _, months)) = years.last_mut() {
                months.push(month_id);
            }
        }

        let mut year_ids = Vec::with_capacity(years.len());
        for (_, year_id, months) in years {
            self.paginate(year_id, months, per_page)?;
            year_ids.push(year_id);
        }
        info!(years = year_ids.len(), "date archive");
        self.paginate(root, year_ids, per_page)
    }

    fn push_archive(
        &mut self,
        components: Vec<String>,
        year: Option<i32>,
        month: Option<u32>,
    ) -> EndpointId {
        self.site.endpoints.push(
            Endpoint::new(components, EndpointKind::DateArchive { year, month })
                .with_template(theme::DATE_ARCHIVE)
                .with_listing(Listing {
                    title: archive_title(year, month),
                    ..Listing::default()
                }),
        )
    }

    /// The main home lists PK documents; a subsite home lists all of the
    /// subsite's documents. Both newest first.
    fn home_routes(&mut self) -> Result<(), BuildError> {
        let items = self
            .stores
            .get(&None)
            .map(|s| s.with_pk.recent(&self.site.endpoints))
            .unwrap_or_default()
            .to_vec();
        let home = self.site.endpoints.push(
            Endpoint::new(Vec::new(), EndpointKind::Home)
                .with_template(theme::HOME)
                .with_listing(Listing {
                    title: self.site.config.title.clone(),
                    ..Listing::default()
                }),
        );
        self.paginate(home, items, self.site.config.per_page)?;

        let subsites: Vec<Subsite> = self.site.subsites.iter().cloned().collect();
        for subsite in subsites {
            let slug = subsite.slug().to_string();
            let template = self.template_for(Some(&slug), theme::HOME);
            if !self.templates.has_template(&template) {
                return Err(RouteError::MissingTemplate {
                    srp: subsite.srp.clone(),
                    template,
                }
                .into());
            }
            let items = self
                .stores
                .get(&Some(slug.clone()))
                .map(SiteStores::combined)
                .unwrap_or_default()
                .recent(&self.site.endpoints)
                .to_vec();
            let components = self.site.slugs.resolve_url_components(&slug)?;
            let id = self.site.endpoints.push(
                Endpoint::new(components, EndpointKind::Home)
                    .with_template(template)
                    .with_subsite(Some(slug))
                    .with_listing(Listing {
                        title: subsite.config.title(&self.site.config).to_string(),
                        srp: Some(subsite.srp.clone()),
                        ..Listing::default()
                    }),
            );
            self.paginate(id, items, subsite.config.per_page(&self.site.config))?;
        }
        Ok(())
    }

    // =========================================================================
    // Phases 11-12: fixed routes and assets
    // =========================================================================

    fn fixed_routes(&mut self) -> Result<(), BuildError> {
        for (name, kind, template) in [
            ("404.html", EndpointKind::NotFound, theme::NOT_FOUND),
            ("index.xml", EndpointKind::Rss, theme::RSS),
            ("sitemap.xml", EndpointKind::Sitemap, theme::SITEMAP),
        ] {
            let id = self
                .site
                .endpoints
                .push(Endpoint::new(vec![name.to_string()], kind).with_template(template));
            self.add_route(id)?;
        }
        self.site.feed = self
            .stores
            .get(&None)
            .map(|s| s.with_pk.recent(&self.site.endpoints))
            .unwrap_or_default()
            .iter()
            .take(self.site.config.rss_items)
            .collect();
        Ok(())
    }

    fn asset_routes(&mut self) -> Result<(), BuildError> {
        let statics = std::mem::take(&mut self.files.statics);
        for file in &statics {
            if Path::new(&file.rel).extension().is_none() {
                debug!(asset = %file.rel, "skipping static file without extension");
                continue;
            }
            let name = self.site.wisdom.fingerprinted_name(&file.source, &file.rel)?;
            let url = format!("/{STATIC_URL}/{name}");
            self.add_asset(&url, EndpointKind::Static(file.source.clone()))?;
            if name.ends_with(".css") {
                self.site.stylesheets.push(url);
            }
        }

        let entries: Vec<_> = self.site.wisdom.image_entries().cloned().collect();
        let mut originals = BTreeSet::new();
        for entry in entries {
            let source = self.site.root.join(&entry.source);
            if !source.is_file() {
                debug!(image = %entry.source, "no route for stale image");
                continue;
            }
            let cached = self.site.wisdom.dir().join(&entry.cached);
            self.add_asset(&entry.url, EndpointKind::CachedImage(cached))?;
            if entry.copy_original && originals.insert(entry.original_url.clone()) {
                self.add_asset(&entry.original_url, EndpointKind::CachedImage(source))?;
            }
        }
        info!(
            statics = statics.len(),
            images = originals.len(),
            "asset routes"
        );
        Ok(())
    }

    fn add_asset(&mut self, url: &str, kind: EndpointKind) -> Result<(), RouteError> {
        let components = url
            .trim_matches('/')
            .split('/')
            .map(str::to_string)
            .collect();
        let id = self.site.endpoints.push(Endpoint::new(components, kind));
        self.add_route(id)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn add_route(&mut self, id: EndpointId) -> Result<(), RouteError> {
        self.site.routes.add_route(&self.site.endpoints, id)
    }

    /// Route every page of a listing plus its `page/1` and `page` redirects.
    fn paginate(
        &mut self,
        base: EndpointId,
        items: Vec<EndpointId>,
        per_page: usize,
    ) -> Result<(), BuildError> {
        let components = self.site.endpoints.get(base).components.clone();
        for tail in [&[PAGE_SEGMENT, "1"][..], &[PAGE_SEGMENT][..]] {
            let mut from = components.clone();
            from.extend(tail.iter().map(|s| s.to_string()));
            let redirect = self.site.endpoints.push(
                Endpoint::new(from, EndpointKind::Redirect(base)).with_template(theme::REDIRECT),
            );
            self.add_route(redirect)?;
        }
        for page in Paginator::new(items, per_page).gen_all_pages(&mut self.site.endpoints, base) {
            self.add_route(page)?;
        }
        Ok(())
    }

    /// `base` under the subsite's `template_path_prefix`, if it has one.
    fn template_for(&self, subsite: Option<&str>, base: &str) -> String {
        let prefix = subsite
            .and_then(|slug| self.site.subsites.get(slug))
            .and_then(|s| s.config.template_path_prefix.as_deref())
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty());
        match prefix {
            Some(prefix) => format!("{prefix}/{base}"),
            None => base.to_string(),
        }
    }
}

fn load_config(root: &Path, wisdom: &mut Wisdom) -> Result<SiteConfig, BuildError> {
    if !root.join(CONFIG_FILENAME).is_file() {
        return Ok(SiteConfig::default());
    }
    Ok(wisdom.get_config(ConfigBucket::Site, Path::new(CONFIG_FILENAME), |path| {
        config::parse_site_config(&fs::read_to_string(path)?)
    })?)
}

/// `Date Archive`, `2024` or `March 2024`.
pub fn archive_title(year: Option<i32>, month: Option<u32>) -> String {
    match (year, month) {
        (Some(year), Some(month)) => {
            let name = u8::try_from(month)
                .ok()
                .and_then(|m| chrono::Month::try_from(m).ok())
                .map(|m| m.name())
                .unwrap_or_default();
            format!("{name} {year}")
        }
        (Some(year), None) => year.to_string(),
        _ => "Date Archive".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SiteFixture;

    fn titles(site: &Site, url: &str) -> Vec<String> {
        let id = site.routes.get(url).unwrap();
        let page = site.endpoints.get(id).paginator_page.as_ref().unwrap();
        page.items
            .iter()
            .map(|&item| site.endpoints.get(item).listing.title.clone())
            .collect()
    }

    fn dated(slug: &str, pk: Option<u64>, date: &str) -> String {
        let mut meta = format!("slug = \"{slug}\"\ntitle = \"{slug}\"\ndate = \"{date}\"");
        if let Some(pk) = pk {
            meta.push_str(&format!("\npk = {pk}"));
        }
        meta
    }

    // =========================================================================
    // Basic routes
    // =========================================================================

    #[test]
    fn content_home_and_fixed_routes() {
        let fx = SiteFixture::new();
        fx.page("content/hello.md", &dated("hello", Some(42), "2024-03-01"), "Hi.");
        fx.page("content/about.md", "slug = \"about\"", "About.");
        let site = fx.build().unwrap();

        for url in [
            "/",
            "/page/",
            "/page/1/",
            "/42-hello/",
            "/42/",
            "/about/",
            "/404.html",
            "/index.xml",
            "/sitemap.xml",
        ] {
            assert!(site.routes.contains(url), "missing {url}");
        }
        assert_eq!(titles(&site, "/"), ["hello"]);
        assert_eq!(site.feed.len(), 1);
        assert_eq!(site.docs.len(), 2);

        let redirect = site.endpoints.get(site.routes.get("/42/").unwrap());
        match redirect.kind {
            EndpointKind::Redirect(target) => assert_eq!(site.url_of(target), "/42-hello/"),
            ref other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn rebuild_renders_only_changed_documents() {
        let fx = SiteFixture::new();
        fx.page("content/a.md", "slug = \"a\"", "One.");
        fx.page("content/b.md", "slug = \"b\"", "Two.");
        assert_eq!(fx.build().unwrap().wisdom.stats.misses, 2);

        fx.touch("content/a.md");
        let site = fx.build().unwrap();
        assert_eq!(site.wisdom.stats.misses, 1);
        assert_eq!(site.wisdom.stats.hits, 1);
    }

    #[test]
    fn pk_in_url_can_be_disabled() {
        let fx = SiteFixture::new();
        fx.config("pk_in_url = false");
        fx.page("content/hello.md", &dated("hello", Some(42), "2024-03-01"), "Hi.");
        let site = fx.build().unwrap();
        assert!(site.routes.contains("/hello/"));
        assert!(site.routes.contains("/42/"));
    }

    #[test]
    fn home_paginates_by_per_page() {
        let fx = SiteFixture::new();
        fx.config("per_page = 2");
        for i in 1..=5 {
            fx.page(
                &format!("content/p{i}.md"),
                &dated(&format!("p{i}"), Some(i), &format!("2024-01-0{i}")),
                "",
            );
        }
        let site = fx.build().unwrap();
        assert!(site.routes.contains("/page/2/"));
        assert!(site.routes.contains("/page/3/"));
        assert!(!site.routes.contains("/page/4/"));
        assert_eq!(titles(&site, "/"), ["p5", "p4"]);
        assert_eq!(titles(&site, "/page/3/"), ["p1"]);
    }

    #[test]
    fn content_nav_links_neighbours() {
        let fx = SiteFixture::new();
        fx.page("content/a.md", &dated("a", Some(1), "2024-01-01"), "");
        fx.page("content/b.md", &dated("b", Some(2), "2024-02-01"), "");
        fx.page("content/c.md", &dated("c", Some(3), "2024-03-01"), "");
        let site = fx.build().unwrap();
        let b = site.endpoints.get(site.routes.get("/2-b/").unwrap());
        assert_eq!(b.prev.map(|id| site.url_of(id)).as_deref(), Some("/1-a/"));
        assert_eq!(b.next.map(|id| site.url_of(id)).as_deref(), Some("/3-c/"));
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn url_collision_names_both_sources() {
        let fx = SiteFixture::new();
        fx.config("pk_in_url = true");
        fx.page("content/a.md", "slug = \"42\"", "");
        fx.page("content/b.md", &dated("foo", Some(42), "2024-01-01"), "");
        let err = fx.build().unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, BuildError::Route(RouteError::Collision { .. })));
        assert!(message.contains("content/a.md"), "{message}");
        assert!(message.contains("content/b.md"), "{message}");
    }

    #[test]
    fn missing_template_is_fatal() {
        let fx = SiteFixture::new();
        fx.page("content/a.md", "slug = \"a\"\nuse_template = \"pages/essay.html\"", "");
        let err = fx.build().unwrap_err();
        assert!(matches!(
            err,
            BuildError::Route(RouteError::MissingTemplate { .. })
        ));
    }

    #[test]
    fn use_template_switches_template() {
        let fx = SiteFixture::new();
        fx.page("content/a.md", "slug = \"a\"\nuse_template = \"pages/plain.html\"", "");
        let site = fx.build().unwrap();
        let a = site.endpoints.get(site.routes.get("/a/").unwrap());
        assert_eq!(a.template.as_deref(), Some(theme::PLAIN));
    }

    #[test]
    fn required_fields_apply_below_taxonomy() {
        let fx = SiteFixture::new();
        fx.config("[required_fields]\n\"topics\" = [\"description\"]");
        fx.taxonomy("topics", "Topics", "");
        fx.taxonomy("topics/rust", "Rust", "");
        fx.page(
            "content/a.md",
            "slug = \"a\"\n[meta.taxonomy]\n\"topics/rust\" = true",
            "",
        );
        let err = fx.build().unwrap_err();
        match err {
            BuildError::Route(RouteError::MissingField { field, taxonomy, .. }) => {
                assert_eq!(field, "description");
                assert_eq!(taxonomy, "topics");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn unknown_content_membership_is_fatal() {
        let fx = SiteFixture::new();
        fx.page("content/a.md", "slug = \"a\"\n[meta.taxonomy]\nnope = true", "");
        let err = fx.build().unwrap_err();
        assert!(matches!(
            err,
            BuildError::Taxonomy(TaxonomyError::UnknownMembership { .. })
        ));
        assert!(err.to_string().contains("content/a.md"));
    }

    #[test]
    fn content_slug_colliding_with_taxonomy_is_fatal() {
        let fx = SiteFixture::new();
        fx.taxonomy("topics", "Topics", "");
        fx.page("content/topics.md", "slug = \"topics\"", "");
        let err = fx.build().unwrap_err();
        assert!(matches!(
            err,
            BuildError::Resolve(ResolveError::SlugCollision { .. })
        ));
    }

    // =========================================================================
    // Subsites
    // =========================================================================

    #[test]
    fn subsite_urls_and_home() {
        let fx = SiteFixture::new();
        fx.page("content/about.md", "slug = \"about\"", "");
        fx.write(
            "content/notes/config.toml",
            "parent_slug = \"about\"\nsubsite_slug = \"notes\"\ntemplate_path_prefix = \"notes\"\nper_page = 1\n",
        );
        fx.page("content/notes/first.md", &dated("first", Some(7), "2024-01-01"), "");
        fx.page("content/notes/second.md", &dated("second", None, "2024-02-01"), "");
        let site = fx.build().unwrap();

        for url in [
            "/about/notes/7-first/",
            "/about/notes/second/",
            "/about/notes/",
            "/about/notes/page/2/",
            "/7/",
        ] {
            assert!(site.routes.contains(url), "missing {url}");
        }
        assert_eq!(titles(&site, "/about/notes/"), ["second"]);
        assert_eq!(titles(&site, "/"), Vec::<String>::new());

        let first = site.endpoints.get(site.routes.get("/about/notes/7-first/").unwrap());
        assert_eq!(first.template.as_deref(), Some("notes/pages/content.html"));
        assert_eq!(first.subsite.as_deref(), Some("notes"));
        assert_eq!(
            first.next.map(|id| site.url_of(id)).as_deref(),
            Some("/about/notes/second/")
        );
        let home = site.endpoints.get(site.routes.get("/about/notes/").unwrap());
        assert_eq!(home.template.as_deref(), Some("notes/pages/home.html"));
    }

    #[test]
    fn subsite_with_unknown_parent_is_fatal() {
        let fx = SiteFixture::new();
        fx.write(
            "content/notes/config.toml",
            "parent_slug = \"nowhere\"\nsubsite_slug = \"notes\"\n",
        );
        let err = fx.build().unwrap_err();
        assert!(matches!(
            err,
            BuildError::Resolve(ResolveError::UnknownParent { .. })
        ));
    }

    // =========================================================================
    // Taxonomy listings
    // =========================================================================

    #[test]
    fn series_listing_order() {
        let fx = SiteFixture::new();
        fx.taxonomy("series", "Series", "");
        for (slug, part, date) in [("p1", 1, "2024-01-03"), ("p3", 3, "2024-01-01"), ("p2", 2, "2024-01-02")] {
            fx.page(
                &format!("content/{slug}.md"),
                &format!("{}\n[meta.taxonomy]\nseries = {part}", dated(slug, None, date)),
                "",
            );
        }
        fx.page(
            "content/extra.md",
            &format!("{}\n[meta.taxonomy]\nseries = true", dated("extra", None, "2024-02-01")),
            "",
        );
        let site = fx.build().unwrap();
        assert_eq!(titles(&site, "/series/"), ["p1", "p2", "p3", "extra"]);
        assert!(site.taxonomy_bodies.contains_key("series"));
    }

    #[test]
    fn series_gap_is_fatal() {
        let fx = SiteFixture::new();
        fx.taxonomy("series", "Series", "");
        fx.page("content/a.md", "slug = \"a\"\n[meta.taxonomy]\nseries = 1", "");
        fx.page("content/b.md", "slug = \"b\"\n[meta.taxonomy]\nseries = 3", "");
        let err = fx.build().unwrap_err();
        assert!(matches!(err, BuildError::Store(StoreError::Gap { .. })));
        assert!(err.to_string().contains("content/b.md"));
    }

    #[test]
    fn taxonomy_listing_rules() {
        let fx = SiteFixture::new();
        fx.taxonomy("topics", "Topics", "");
        fx.taxonomy("topics/rust", "Rust", "");
        fx.taxonomy("topics/go", "Go", "");
        fx.taxonomy("tags", "Tags", "pseudo = true");
        fx.taxonomy("misc", "Misc", "");
        fx.page(
            "content/a.md",
            "slug = \"a\"\n[meta.taxonomy]\n\"topics/rust\" = true\ntags = true",
            "",
        );
        let site = fx.build().unwrap();

        assert!(site.routes.contains("/topics/rust/"));
        assert!(site.routes.contains("/topics/"));
        assert!(site.routes.contains("/topics/page/1/"));
        assert!(!site.routes.contains("/topics/go/"));
        assert!(!site.routes.contains("/tags/"));
        assert!(!site.routes.contains("/misc/"));
        assert_eq!(titles(&site, "/topics/"), ["Rust"]);
        assert_eq!(titles(&site, "/topics/rust/"), ["a"]);
    }

    #[test]
    fn listings_only_link_routed_taxonomies() {
        let fx = SiteFixture::new();
        fx.taxonomy("topics", "Topics", "");
        fx.taxonomy("topics/rust", "Rust", "");
        fx.taxonomy("topics/rust/deep", "Deep", "pseudo = true");
        fx.taxonomy("topics/go", "Go", "");
        fx.page(
            "content/a.md",
            "slug = \"a\"\n[meta.taxonomy]\n\"topics/rust/deep\" = true",
            "",
        );
        fx.page(
            "content/b.md",
            "slug = \"b\"\n[meta.taxonomy]\n\"topics/go\" = true",
            "",
        );
        let site = fx.build().unwrap();

        assert!(!site.routes.contains("/topics/rust/"));
        assert!(!site.routes.contains("/topics/rust/deep/"));
        assert_eq!(titles(&site, "/topics/"), ["Go"]);
        for (_, id) in site.routes.iter() {
            if let Some(page) = &site.endpoints.get(id).paginator_page {
                for &item in &page.items {
                    assert!(site.routes.contains(&site.url_of(item)));
                }
            }
        }
    }

    // =========================================================================
    // Galleries
    // =========================================================================

    const GALLERY_META: &str = "slug = \"trip\"\n[meta.taxonomy]\nphotos = true\n[[meta.gallery.img]]\nkey = \"b.png\"\ntitle = \"Bee\"\ncover = true";

    fn gallery_fixture(meta: &str) -> SiteFixture {
        let fx = SiteFixture::new();
        fx.taxonomy("photos", "Photos", "gallery = true");
        fx.page("content/trip/index.md", meta, "A trip.");
        fx.image("content/trip/a.png", 8, 6);
        fx.image("content/trip/b.png", 6, 8);
        fx
    }

    #[test]
    fn gallery_items_and_image_routes() {
        let site = gallery_fixture(GALLERY_META).build().unwrap();
        for url in [
            "/trip/",
            "/trip/1/",
            "/trip/2/",
            "/trip/page/1/",
            "/_img/content/trip/a_1600_1600.png",
            "/_img/content/trip/a_400_400.png",
            "/_img/content/trip/a.png",
            "/_img/content/trip/b.png",
        ] {
            assert!(site.routes.contains(url), "missing {url}");
        }
        let first = site.endpoints.get(site.routes.get("/trip/1/").unwrap());
        let second_id = site.routes.get("/trip/2/").unwrap();
        assert_eq!(first.next, Some(second_id));
        assert_eq!(site.endpoints.get(second_id).listing.title, "Bee");
        assert_eq!(titles(&site, "/trip/").len(), 2);
        assert!(site.doc(0).is_gallery());
    }

    #[test]
    fn gallery_allows_one_cover() {
        let meta = format!("{GALLERY_META}\n[[meta.gallery.img]]\nkey = \"a.png\"\ncover = true");
        let err = gallery_fixture(&meta).build().unwrap_err();
        assert!(matches!(err, BuildError::Route(RouteError::Gallery { .. })));
    }

    #[test]
    fn gallery_forbids_meta_img() {
        let meta = "slug = \"trip\"\nimg = \"a.png\"\n[meta.taxonomy]\nphotos = true";
        let err = gallery_fixture(meta).build().unwrap_err();
        assert!(err.to_string().contains("meta.img"));
    }

    // =========================================================================
    // Date archives and assets
    // =========================================================================

    #[test]
    fn date_archive_routes() {
        let fx = SiteFixture::new();
        fx.config("date_archive_url = \"archive\"");
        fx.page("content/a.md", &dated("a", Some(1), "2024-03-15"), "");
        fx.page("content/b.md", &dated("b", None, "2024-03-01"), "");
        fx.page("content/c.md", &dated("c", Some(2), "2024-05-02"), "");
        fx.page("content/d.md", &dated("d", Some(3), "2023-12-31"), "");
        let site = fx.build().unwrap();

        for url in [
            "/archive/",
            "/archive/2023/",
            "/archive/2023/12/",
            "/archive/2024/",
            "/archive/2024/3/",
            "/archive/2024/5/",
        ] {
            assert!(site.routes.contains(url), "missing {url}");
        }
        assert_eq!(titles(&site, "/archive/2024/3/"), ["b", "a"]);
        assert_eq!(titles(&site, "/archive/2024/"), ["March 2024", "May 2024"]);
        assert_eq!(titles(&site, "/archive/"), ["2023", "2024"]);
    }

    #[test]
    fn no_archive_without_config() {
        let fx = SiteFixture::new();
        fx.page("content/a.md", &dated("a", Some(1), "2024-03-15"), "");
        let site = fx.build().unwrap();
        assert!(!site.routes.iter().any(|(url, _)| url.contains("2024")));
    }

    #[test]
    fn static_routes_are_fingerprinted() {
        let fx = SiteFixture::new();
        fx.write("theme/static/css/site.css", "body {}");
        fx.write("theme/static/img/logo.svg", "<svg/>");
        let site = fx.build().unwrap();
        assert!(site.routes.contains("/_static/img/logo.svg"));
        assert_eq!(site.stylesheets.len(), 1);
        assert!(site.stylesheets[0].starts_with("/_static/css/site_"));
        assert!(site.routes.contains(&site.stylesheets[0]));
    }

    #[test]
    fn archive_titles() {
        assert_eq!(archive_title(None, None), "Date Archive");
        assert_eq!(archive_title(Some(2024), None), "2024");
        assert_eq!(archive_title(Some(2024), Some(12)), "December 2024");
    }
}
