//! Templates.
//!
//! Publishing hands every rendered route a [`PageView`] and a template name
//! and asks a [`TemplateRenderer`] for the output text. The built-in
//! [`Theme`] renders with [maud](https://maud.lambda.xyz/):
//!
//! | Template | Used for |
//! |---|---|
//! | `pages/home.html` | site and subsite home listings |
//! | `pages/content.html` | documents and gallery roots |
//! | `pages/plain.html` | documents without site chrome (`use_template`) |
//! | `pages/taxonomy.html` | taxonomy listings |
//! | `pages/gallery_item.html` | single gallery photos |
//! | `pages/date_archive.html` | year and month archives |
//! | `pages/redirect.html` | PK and page-1 redirects |
//! | `404.html`, `index.xml`, `sitemap.xml` | fixed routes |
//!
//! Inside a subsite with a `template_path_prefix` of `notes`, templates are
//! requested as `notes/pages/home.html`. The theme renders the base template
//! and adds `notes` to the body's classes so a stylesheet can tell the
//! subsite apart.

use crate::paginator::PageLink;
use chrono::NaiveDateTime;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use thiserror::Error;

const THEME_CSS: &str = include_str!("../static/theme.css");

pub const HOME: &str = "pages/home.html";
pub const CONTENT: &str = "pages/content.html";
pub const PLAIN: &str = "pages/plain.html";
pub const TAXONOMY: &str = "pages/taxonomy.html";
pub const GALLERY_ITEM: &str = "pages/gallery_item.html";
pub const DATE_ARCHIVE: &str = "pages/date_archive.html";
pub const REDIRECT: &str = "pages/redirect.html";
pub const NOT_FOUND: &str = "404.html";
pub const RSS: &str = "index.xml";
pub const SITEMAP: &str = "sitemap.xml";

const TEMPLATES: &[&str] = &[
    HOME,
    CONTENT,
    PLAIN,
    TAXONOMY,
    GALLERY_ITEM,
    DATE_ARCHIVE,
    REDIRECT,
    NOT_FOUND,
    RSS,
    SITEMAP,
];

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("unknown template '{0}'")]
    Unknown(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteView {
    pub title: String,
    pub description: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub title: String,
}

/// A page's taxonomy links that share one top-level node, e.g. every
/// `topics/...` membership under "Topics".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxonomyGroup {
    pub top_level: String,
    pub title: String,
    pub links: Vec<Link>,
}

/// One entry of a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListItem {
    pub url: String,
    pub title: String,
    pub date: Option<NaiveDateTime>,
    /// Rendered html.
    pub summary: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageView {
    pub url: String,
    pub original_url: String,
    pub alt: String,
}

/// An entry of the RSS feed or the sitemap. Urls are absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub url: String,
    pub title: String,
    pub date: Option<NaiveDateTime>,
    pub summary: Option<String>,
}

/// Everything a template may show for one route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageView {
    pub site: SiteView,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub date: Option<NaiveDateTime>,
    /// Rendered html of the lead paragraph.
    pub lead: Option<String>,
    /// Rendered html of the document body.
    pub body: Option<String>,
    pub footnotes: Vec<String>,
    pub breadcrumbs: Vec<Link>,
    /// Grouped by top-level node, in slug-path order.
    pub taxonomies: Vec<TaxonomyGroup>,
    pub items: Vec<ListItem>,
    pub page_links: Vec<PageLink>,
    pub prev: Option<Link>,
    pub next: Option<Link>,
    pub image: Option<ImageView>,
    /// Target url of a redirect page.
    pub redirect: Option<String>,
    pub stylesheets: Vec<String>,
    pub entries: Vec<FeedEntry>,
}

impl PageView {
    /// Taxonomy links of this page under the top-level node `top_level`.
    pub fn taxonomies_in(&self, top_level: &str) -> &[Link] {
        self.taxonomies
            .iter()
            .find(|group| group.top_level == top_level)
            .map_or(&[], |group| group.links.as_slice())
    }
}

/// Turns a template name and a view into output text. `None` means the
/// route produces no file.
pub trait TemplateRenderer {
    fn has_template(&self, name: &str) -> bool;

    fn render(&self, name: &str, view: &PageView) -> Result<Option<String>, TemplateError>;
}

/// Split `notes/pages/home.html` into (`Some("notes")`, `pages/home.html`).
fn resolve(name: &str) -> Option<(Option<&str>, &'static str)> {
    TEMPLATES.iter().find_map(|&base| {
        if name == base {
            return Some((None, base));
        }
        let prefix = name.strip_suffix(base)?.strip_suffix('/')?;
        (!prefix.is_empty()).then_some((Some(prefix), base))
    })
}

/// The built-in maud theme.
#[derive(Debug, Default, Clone, Copy)]
pub struct Theme;

impl TemplateRenderer for Theme {
    fn has_template(&self, name: &str) -> bool {
        resolve(name).is_some()
    }

    fn render(&self, name: &str, view: &PageView) -> Result<Option<String>, TemplateError> {
        let (prefix, base) = resolve(name).ok_or_else(|| TemplateError::Unknown(name.into()))?;
        let class = prefix.map(|p| p.replace('/', "-"));
        let class = class.as_deref();
        let markup = match base {
            HOME => render_listing(view, "home", class),
            CONTENT => render_content(view, class),
            PLAIN => render_plain(view, class),
            TAXONOMY => render_listing(view, "taxonomy", class),
            GALLERY_ITEM => render_gallery_item(view, class),
            DATE_ARCHIVE => render_listing(view, "archive", class),
            REDIRECT => render_redirect(view),
            NOT_FOUND => render_not_found(view),
            RSS => render_rss(view),
            _ => render_sitemap(view),
        };
        Ok(Some(markup.into_string()))
    }
}

// ============================================================================
// HTML Components
// ============================================================================

fn base_document(view: &PageView, body_class: Option<&str>, content: Markup) -> Markup {
    let title = if view.title.is_empty() || view.title == view.site.title {
        view.site.title.clone()
    } else {
        format!("{} - {}", view.title, view.site.title)
    };
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                @if let Some(description) = &view.description {
                    meta name="description" content=(description);
                }
                style { (PreEscaped(THEME_CSS)) }
                @for href in &view.stylesheets {
                    link rel="stylesheet" href=(href);
                }
                link rel="alternate" type="application/rss+xml" href="/index.xml";
            }
            body class=[body_class] {
                (content)
            }
        }
    }
}

fn site_header(view: &PageView) -> Markup {
    html! {
        header.site-header {
            nav.breadcrumb {
                a href="/" { (view.site.title) }
                @for crumb in &view.breadcrumbs {
                    a href=(crumb.url) { (crumb.title) }
                }
            }
        }
    }
}

fn date_line(date: Option<NaiveDateTime>) -> Markup {
    html! {
        @if let Some(date) = date {
            time datetime=(date.format("%Y-%m-%d").to_string()) {
                (date.format("%B %-d, %Y").to_string())
            }
        }
    }
}

fn item_list(items: &[ListItem]) -> Markup {
    html! {
        ul.listing {
            @for item in items {
                li {
                    @if let Some(thumb) = &item.thumbnail {
                        a href=(item.url) { img src=(thumb) alt=(item.title) loading="lazy"; }
                    }
                    h2 { a href=(item.url) { (item.title) } }
                    (date_line(item.date))
                    @if let Some(summary) = &item.summary {
                        div.summary { (PreEscaped(summary)) }
                    }
                }
            }
        }
    }
}

fn thumbnail_grid(items: &[ListItem]) -> Markup {
    html! {
        div.thumbnail-grid {
            @for item in items {
                a href=(item.url) {
                    @if let Some(thumb) = &item.thumbnail {
                        img src=(thumb) alt=(item.title) loading="lazy";
                    } @else {
                        (item.title)
                    }
                }
            }
        }
    }
}

fn page_links(links: &[PageLink]) -> Markup {
    html! {
        @if links.len() > 1 {
            ul.page-links {
                @for link in links {
                    li class=[link.current.then_some("current")] {
                        a href=(link.url) { (link.number) }
                    }
                }
            }
        }
    }
}

fn prev_next(view: &PageView) -> Markup {
    html! {
        @if view.prev.is_some() || view.next.is_some() {
            nav.prev-next {
                @if let Some(prev) = &view.prev {
                    a rel="prev" href=(prev.url) { "← " (prev.title) }
                } @else {
                    span {}
                }
                @if let Some(next) = &view.next {
                    a rel="next" href=(next.url) { (next.title) " →" }
                }
            }
        }
    }
}

// ============================================================================
// Page Renderers
// ============================================================================

fn render_listing(view: &PageView, kind: &str, prefix: Option<&str>) -> Markup {
    let class = match prefix {
        Some(prefix) => format!("{kind} {prefix}"),
        None => kind.to_string(),
    };
    let content = html! {
        (site_header(view))
        main {
            @if !view.title.is_empty() {
                h1 { (view.title) }
            }
            @if let Some(body) = &view.body {
                div.description { (PreEscaped(body)) }
            }
            (item_list(&view.items))
            (page_links(&view.page_links))
        }
    };
    base_document(view, Some(&class), content)
}

fn render_content(view: &PageView, prefix: Option<&str>) -> Markup {
    let content = html! {
        (site_header(view))
        main {
            article {
                h1 { (view.title) }
                p.meta { (date_line(view.date)) }
                @if let Some(lead) = &view.lead {
                    div.lead { (PreEscaped(lead)) }
                }
                @if let Some(image) = &view.image {
                    figure.photo {
                        a href=(image.original_url) { img src=(image.url) alt=(image.alt); }
                    }
                }
                @if let Some(body) = &view.body {
                    (PreEscaped(body))
                }
                @if !view.items.is_empty() {
                    (thumbnail_grid(&view.items))
                    (page_links(&view.page_links))
                }
                @if !view.footnotes.is_empty() {
                    section.footnotes {
                        @for note in &view.footnotes {
                            (PreEscaped(note))
                        }
                    }
                }
                @for group in &view.taxonomies {
                    p.taxonomies data-top-level=(group.top_level) {
                        span.group { (group.title) ": " }
                        @for tax in &group.links {
                            a href=(tax.url) { (tax.title) }
                        }
                    }
                }
            }
            (prev_next(view))
        }
    };
    base_document(view, prefix, content)
}

fn render_plain(view: &PageView, prefix: Option<&str>) -> Markup {
    let content = html! {
        main {
            @if let Some(body) = &view.body {
                (PreEscaped(body))
            }
        }
    };
    base_document(view, prefix, content)
}

fn render_gallery_item(view: &PageView, prefix: Option<&str>) -> Markup {
    let class = match prefix {
        Some(prefix) => format!("photo-view {prefix}"),
        None => "photo-view".to_string(),
    };
    let content = html! {
        (site_header(view))
        main {
            @if let Some(image) = &view.image {
                figure.photo {
                    a href=(image.original_url) {
                        img src=(image.url) alt=(image.alt);
                    }
                    @if let Some(description) = &view.description {
                        figcaption { (description) }
                    }
                }
            }
            (prev_next(view))
        }
    };
    base_document(view, Some(&class), content)
}

fn render_redirect(view: &PageView) -> Markup {
    let target = view.redirect.as_deref().unwrap_or("/");
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                title { (view.site.title) }
                link rel="canonical" href=(target);
                meta http-equiv="refresh" content={ "0; url=" (target) };
            }
            body {
                p { a href=(target) { (target) } }
            }
        }
    }
}

fn render_not_found(view: &PageView) -> Markup {
    let content = html! {
        (site_header(view))
        main {
            h1 { "Not found" }
            p { "There is nothing at this address. " a href="/" { "Start over" } "." }
        }
    };
    base_document(view, Some("not-found"), content)
}

// ============================================================================
// Feeds
// ============================================================================

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

fn render_rss(view: &PageView) -> Markup {
    html! {
        (PreEscaped(XML_DECLARATION))
        rss version="2.0" {
            channel {
                title { (view.site.title) }
                link { (view.site.base_url) }
                description { (view.site.description) }
                @for entry in &view.entries {
                    item {
                        title { (entry.title) }
                        link { (entry.url) }
                        guid { (entry.url) }
                        @if let Some(date) = entry.date {
                            pubDate { (date.and_utc().to_rfc2822()) }
                        }
                        @if let Some(summary) = &entry.summary {
                            description { (summary) }
                        }
                    }
                }
            }
        }
    }
}

fn render_sitemap(view: &PageView) -> Markup {
    html! {
        (PreEscaped(XML_DECLARATION))
        urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9" {
            @for entry in &view.entries {
                url {
                    loc { (entry.url) }
                    @if let Some(date) = entry.date {
                        lastmod { (date.format("%Y-%m-%d").to_string()) }
                    }
                }
            }
        }
    }
}
