//! Publishing: the last build phase.
//!
//! Takes a built [`Site`] and writes the final static tree to `publish/`
//! under the site root. The directory is removed and recreated on every
//! run, so its contents always match the current route table exactly.
//!
//! ## Output Structure
//!
//! ```text
//! publish/
//! ├── index.html                     # home, page 1
//! ├── page/2/index.html              # home, page 2
//! ├── page/1/index.html              # redirect to /
//! ├── 42-hello/index.html            # document with PK 42
//! ├── 42/index.html                  # redirect to /42-hello/
//! ├── topics/index.html              # taxonomy listing
//! ├── 404.html
//! ├── index.xml                      # RSS
//! ├── sitemap.xml
//! ├── _static/css/site_<id>.css      # fingerprinted theme asset
//! └── _img/content/trip/a_400_400.png
//! ```
//!
//! Pages are rendered in url order, one [`PageView`] per route. Assets are
//! copied in parallel once images have been materialized.

use crate::cache::CacheError;
use crate::endpoint::{EndpointId, EndpointKind, format_url};
use crate::imaging::ImageBackend;
use crate::metadata::Memberships;
use crate::paginator::{PAGE_LINK_SLOTS, page_links};
use crate::router::{ContentDoc, Site};
use crate::source::FOOTNOTE_COLLECTOR;
use crate::theme::{
    FeedEntry, ImageView, Link, ListItem, PageView, SiteView, TaxonomyGroup, TemplateError,
    TemplateRenderer,
};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const PUBLISH_DIR: &str = "publish";

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("rendering {url}: {source}")]
    Template { url: String, source: TemplateError },
}

/// What a publish run wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub pages: usize,
    pub assets: usize,
    /// Routes whose template produced no output.
    pub skipped: usize,
    pub images_resized: u32,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> GenerateError + '_ {
    move |source| GenerateError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write every route of `site` to `<root>/publish/`.
pub fn publish(
    site: &mut Site,
    templates: &dyn TemplateRenderer,
    backend: &dyn ImageBackend,
) -> Result<PublishReport, GenerateError> {
    let out = site.root.join(PUBLISH_DIR);
    if out.exists() {
        fs::remove_dir_all(&out).map_err(io_err(&out))?;
    }
    fs::create_dir_all(&out).map_err(io_err(&out))?;

    let resized_before = site.wisdom.stats.resized;
    site.wisdom.materialize_images(backend)?;
    let site = &*site;
    let mut report = PublishReport {
        images_resized: site.wisdom.stats.resized - resized_before,
        ..PublishReport::default()
    };

    let mut copies = Vec::new();
    for (url, id) in site.routes.iter() {
        let endpoint = site.endpoints.get(id);
        let dest = out.join(endpoint.output_path());
        if let EndpointKind::Static(source) | EndpointKind::CachedImage(source) = &endpoint.kind {
            copies.push((source.clone(), dest));
            continue;
        }
        let Some(template) = endpoint.template.as_deref() else {
            report.skipped += 1;
            continue;
        };
        let rendered = templates
            .render(template, &page_view(site, id))
            .map_err(|source| GenerateError::Template {
                url: url.to_string(),
                source,
            })?;
        let Some(text) = rendered else {
            debug!(url, "template produced no output");
            report.skipped += 1;
            continue;
        };
        let text = if url.ends_with(".xml") {
            text.trim_start()
        } else {
            text.as_str()
        };
        write_file(&dest, text.as_bytes())?;
        report.pages += 1;
    }

    copies
        .par_iter()
        .map(|(source, dest)| copy_file(source, dest))
        .collect::<Result<Vec<()>, _>>()?;
    report.assets = copies.len();

    info!(
        pages = report.pages,
        assets = report.assets,
        "published to {}",
        out.display()
    );
    Ok(report)
}

fn write_file(dest: &Path, bytes: &[u8]) -> Result<(), GenerateError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    fs::write(dest, bytes).map_err(io_err(dest))
}

fn copy_file(source: &Path, dest: &Path) -> Result<(), GenerateError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    fs::copy(source, dest).map_err(io_err(source))?;
    Ok(())
}

// ============================================================================
// Views
// ============================================================================

fn page_view(site: &Site, id: EndpointId) -> PageView {
    let endpoint = site.endpoints.get(id);
    let mut view = PageView {
        site: SiteView {
            title: site.config.title.clone(),
            description: site.config.description.clone(),
            base_url: site.config.base_url.clone(),
        },
        url: endpoint.url(),
        title: endpoint.listing.title.clone(),
        date: endpoint.listing.date,
        stylesheets: site.stylesheets.clone(),
        prev: endpoint.prev.map(|p| link(site, p)),
        next: endpoint.next.map(|n| link(site, n)),
        ..PageView::default()
    };
    if let Some(page) = &endpoint.paginator_page {
        view.items = page.items.iter().map(|&item| list_item(site, item)).collect();
        view.page_links = page_links(&site.endpoints, id, PAGE_LINK_SLOTS);
    }
    match &endpoint.kind {
        EndpointKind::Home => match endpoint.subsite.as_deref().and_then(|s| site.subsites.get(s)) {
            Some(subsite) => view.description = subsite.config.description.clone(),
            None => {
                view.description =
                    Some(site.config.description.clone()).filter(|d| !d.is_empty());
            }
        },
        EndpointKind::Content(doc) => {
            let doc = site.doc(*doc);
            view.description = doc.meta.description.clone();
            view.lead = doc.meta.lead_content.clone();
            view.body = Some(doc.body.clone());
            view.footnotes = doc.result.collected(FOOTNOTE_COLLECTOR).to_vec();
            view.taxonomies = taxonomy_links(site, &doc.meta.taxonomy);
            view.image = doc.image.as_ref().map(|image| ImageView {
                url: image.url.clone(),
                original_url: image.original_url.clone(),
                alt: view.title.clone(),
            });
            view.breadcrumbs.extend(subsite_link(site, doc));
        }
        EndpointKind::Taxonomy(slug_path) => {
            view.description = site.taxonomy.get(slug_path).and_then(|n| n.description.clone());
            view.body = site.taxonomy_bodies.get(slug_path).cloned();
            for ancestor in site.taxonomy.ancestors(slug_path) {
                let url = format!("/{}/", ancestor.slug_path);
                if site.routes.contains(&url) {
                    view.breadcrumbs.push(Link {
                        url,
                        title: ancestor.title.clone(),
                    });
                }
            }
        }
        EndpointKind::GalleryItem {
            gallery,
            url,
            original_url,
            photo,
            ..
        } => {
            let doc = site.doc(*gallery);
            view.description = photo.as_ref().and_then(|p| p.description.clone());
            view.image = Some(ImageView {
                url: url.clone(),
                original_url: original_url.clone(),
                alt: view.title.clone(),
            });
            view.breadcrumbs = vec![link(site, doc.endpoint)];
        }
        EndpointKind::DateArchive { year, month } => {
            if let Some(archive) = &site.config.date_archive_url {
                if year.is_some() {
                    view.breadcrumbs.push(Link {
                        url: format_url(&[archive.clone()], None),
                        title: crate::router::archive_title(None, None),
                    });
                }
                if let (Some(year), Some(_)) = (year, month) {
                    view.breadcrumbs.push(Link {
                        url: format_url(&[archive.clone(), year.to_string()], None),
                        title: year.to_string(),
                    });
                }
            }
        }
        EndpointKind::Redirect(target) => {
            view.redirect = Some(site.url_of(*target));
        }
        EndpointKind::Rss => {
            view.entries = site
                .feed
                .iter()
                .map(|&item| {
                    let entry = list_item(site, item);
                    FeedEntry {
                        url: absolute(site, &entry.url),
                        title: entry.title,
                        date: entry.date,
                        summary: entry.summary,
                    }
                })
                .collect();
        }
        EndpointKind::Sitemap => {
            view.entries = site
                .routes
                .iter()
                .filter(|(_, id)| site.endpoints.get(*id).add_to_sitemap())
                .map(|(url, id)| FeedEntry {
                    url: absolute(site, url),
                    title: site.endpoints.get(id).listing.title.clone(),
                    date: site.endpoints.get(id).listing.date,
                    summary: None,
                })
                .collect();
        }
        EndpointKind::NotFound | EndpointKind::Static(_) | EndpointKind::CachedImage(_) => {}
    }
    view
}

fn link(site: &Site, id: EndpointId) -> Link {
    Link {
        url: site.url_of(id),
        title: site.endpoints.get(id).listing.title.clone(),
    }
}

fn list_item(site: &Site, id: EndpointId) -> ListItem {
    let endpoint = site.endpoints.get(id);
    let mut item = ListItem {
        url: endpoint.url(),
        title: endpoint.listing.title.clone(),
        date: endpoint.listing.date,
        ..ListItem::default()
    };
    match &endpoint.kind {
        EndpointKind::Content(doc) => {
            let doc = site.doc(*doc);
            item.summary = doc.summary();
            item.thumbnail = thumbnail(site, doc);
        }
        EndpointKind::Taxonomy(slug_path) => {
            item.summary = site.taxonomy.get(slug_path).and_then(|n| n.description.clone());
        }
        EndpointKind::GalleryItem { thumbnail_url, .. } => {
            item.thumbnail = Some(thumbnail_url.clone());
        }
        _ => {}
    }
    item
}

/// A document's `img`, else its gallery cover, else its first gallery image.
fn thumbnail(site: &Site, doc: &ContentDoc) -> Option<String> {
    if let Some(image) = &doc.image {
        return Some(image.url.clone());
    }
    let is_cover = |id: EndpointId| {
        matches!(
            &site.endpoints.get(id).kind,
            EndpointKind::GalleryItem { photo: Some(photo), .. } if photo.cover
        )
    };
    let cover = doc
        .gallery
        .iter()
        .copied()
        .find(|&id| is_cover(id))
        .or_else(|| doc.gallery.first().copied())?;
    match &site.endpoints.get(cover).kind {
        EndpointKind::GalleryItem { thumbnail_url, .. } => Some(thumbnail_url.clone()),
        _ => None,
    }
}

/// Links to the routed, non-pseudo taxonomies among `memberships`,
/// grouped under their top-level node.
fn taxonomy_links(site: &Site, memberships: &Memberships) -> Vec<TaxonomyGroup> {
    let mut groups: Vec<TaxonomyGroup> = Vec::new();
    for slug_path in memberships.keys() {
        let Some(node) = site.taxonomy.get(slug_path) else {
            continue;
        };
        let url = format!("/{slug_path}/");
        if node.pseudo || !site.routes.contains(&url) {
            continue;
        }
        let link = Link {
            url,
            title: node.title.clone(),
        };
        match groups.iter_mut().find(|g| g.top_level == node.top_level) {
            Some(group) => group.links.push(link),
            None => {
                let title = site
                    .taxonomy
                    .top_level_of(slug_path)
                    .map_or_else(|| node.top_level.clone(), |top| top.title.clone());
                groups.push(TaxonomyGroup {
                    top_level: node.top_level.clone(),
                    title,
                    links: vec![link],
                });
            }
        }
    }
    groups
}

fn subsite_link(site: &Site, doc: &ContentDoc) -> Option<Link> {
    let subsite = site.subsites.get(doc.subsite.as_deref()?)?;
    let components = site.slugs.resolve_url_components(subsite.slug()).ok()?;
    Some(Link {
        url: format_url(&components, None),
        title: subsite.config.title(&site.config).to_string(),
    })
}

fn absolute(site: &Site, url: &str) -> String {
    format!("{}{url}", site.config.base_url.trim_end_matches('/'))
}
