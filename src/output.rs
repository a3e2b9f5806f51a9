//! CLI output formatting for builds and publishing.
//!
//! # Information-First Display
//!
//! Every entity (document, taxonomy node, subsite) leads with a positional
//! index, its title and its url. The source file it came from follows as an
//! indented `Source:` line, so the output reads as a content inventory that
//! can still be traced back to files.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Documents
//! 001 Hello → /42-hello/
//!     Source: content/hello.md
//! 002 Trip (3 photos) → /trip/
//!     Source: content/trip/index.md
//!
//! Taxonomy
//! 001 Tags (no listing)
//!     Source: taxonomy/tags.md
//! 002 Topics (2 items) → /topics/
//!     Source: taxonomy/topics.md
//!
//! Subsites
//! 001 Notes → /about/notes/
//!     Source: content/notes/config.toml
//!
//! Routes: 31 (9 pages, 6 redirects, 16 assets)
//! Cache: 3 cached, 1 rendered (4 total)
//! ```
//!
//! ## Publish
//!
//! ```text
//! Published 15 files to publish/ (9 pages, 6 assets)
//! Images: 4 resized
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::endpoint::EndpointKind;
use crate::generate::PublishReport;
use crate::router::Site;
use std::path::Path;

// ============================================================================
// Shared entity display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Index, title, optional detail in parentheses, optional url.
///
/// ```text
/// 001 Trip (3 photos) → /trip/
/// 002 Tags (no listing)
/// ```
fn entity_header(index: usize, title: &str, detail: Option<&str>, url: Option<&str>) -> String {
    let mut line = format!("{} {}", format_index(index), title);
    if let Some(detail) = detail {
        line.push_str(&format!(" ({detail})"));
    }
    if let Some(url) = url {
        line.push_str(&format!(" → {url}"));
    }
    line
}

fn source_line(depth: usize, source: &Path) -> String {
    format!("{}Source: {}", indent(depth), source.display())
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Build
// ============================================================================

/// Inventory of a built site: documents, taxonomy, subsites, route counts.
pub fn format_build_summary(site: &Site) -> Vec<String> {
    let mut lines = vec!["Documents".to_string()];
    for (i, doc) in site.docs.iter().enumerate() {
        let detail = doc
            .is_gallery()
            .then(|| plural(doc.gallery.len(), "photo", "photos"));
        let url = site.url_of(doc.endpoint);
        lines.push(entity_header(
            i + 1,
            doc.meta.display_title(),
            detail.as_deref(),
            Some(&url),
        ));
        lines.push(source_line(1, &doc.srp));
    }

    if !site.taxonomy.is_empty() {
        lines.push(String::new());
        lines.push("Taxonomy".to_string());
        for (i, node) in site.taxonomy.iter().enumerate() {
            let url = format!("/{}/", node.slug_path);
            let header = match site.routes.get(&url) {
                Some(id) => {
                    let count = site
                        .endpoints
                        .get(id)
                        .paginator_page
                        .as_ref()
                        .map_or(0, |page| page.items.len());
                    let count = plural(count, "item", "items");
                    entity_header(i + 1, &node.title, Some(&count), Some(&url))
                }
                None => entity_header(i + 1, &node.title, Some("no listing"), None),
            };
            lines.push(header);
            lines.push(source_line(1, &node.srp));
        }
    }

    if !site.subsites.is_empty() {
        lines.push(String::new());
        lines.push("Subsites".to_string());
        for (i, subsite) in site.subsites.iter().enumerate() {
            let url = site
                .slugs
                .resolve_url_components(subsite.slug())
                .ok()
                .map(|components| crate::endpoint::format_url(&components, None));
            lines.push(entity_header(
                i + 1,
                subsite.config.title(&site.config),
                None,
                url.as_deref(),
            ));
            lines.push(source_line(1, &subsite.srp));
        }
    }

    let (mut pages, mut redirects, mut assets) = (0, 0, 0);
    for (_, id) in site.routes.iter() {
        match site.endpoints.get(id).kind {
            EndpointKind::Redirect(_) => redirects += 1,
            EndpointKind::Static(_) | EndpointKind::CachedImage(_) => assets += 1,
            _ => pages += 1,
        }
    }
    lines.push(String::new());
    lines.push(format!(
        "Routes: {} ({}, {}, {})",
        site.routes.len(),
        plural(pages, "page", "pages"),
        plural(redirects, "redirect", "redirects"),
        plural(assets, "asset", "assets"),
    ));
    lines.push(format!("Cache: {}", site.wisdom.stats));
    lines
}

pub fn print_build_summary(site: &Site) {
    for line in format_build_summary(site) {
        println!("{}", line);
    }
}

// ============================================================================
// Publish
// ============================================================================

pub fn format_publish_report(report: &PublishReport, out: &Path) -> Vec<String> {
    let mut lines = vec![format!(
        "Published {} to {} ({}, {})",
        plural(report.pages + report.assets, "file", "files"),
        out.display(),
        plural(report.pages, "page", "pages"),
        plural(report.assets, "asset", "assets"),
    )];
    if report.images_resized > 0 {
        lines.push(format!("Images: {} resized", report.images_resized));
    }
    if report.skipped > 0 {
        lines.push(format!(
            "{}Skipped: {}",
            indent(1),
            plural(report.skipped, "route", "routes")
        ));
    }
    lines
}

pub fn print_publish_report(report: &PublishReport, out: &Path) {
    for line in format_publish_report(report, out) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SiteFixture;

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_pads_to_three_digits() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(1000), "1000");
    }

    #[test]
    fn indent_levels() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    #[test]
    fn entity_header_variants() {
        assert_eq!(entity_header(1, "Hello", None, Some("/hello/")), "001 Hello → /hello/");
        assert_eq!(
            entity_header(2, "Trip", Some("3 photos"), Some("/trip/")),
            "002 Trip (3 photos) → /trip/"
        );
        assert_eq!(entity_header(3, "Tags", Some("no listing"), None), "003 Tags (no listing)");
    }

    #[test]
    fn plural_forms() {
        assert_eq!(plural(1, "page", "pages"), "1 page");
        assert_eq!(plural(0, "page", "pages"), "0 pages");
    }

    // =========================================================================
    // Reports
    // =========================================================================

    #[test]
    fn build_summary_lists_documents_and_taxonomy() {
        let fx = SiteFixture::new();
        fx.taxonomy("topics", "Topics", "");
        fx.taxonomy("tags", "Tags", "pseudo = true");
        fx.page(
            "content/hello.md",
            "slug = \"hello\"\npk = 42\ndate = \"2024-03-01\"\ntitle = \"Hello\"\n[meta.taxonomy]\ntopics = true\ntags = true",
            "",
        );
        let site = fx.build().unwrap();
        let lines = format_build_summary(&site);

        assert_eq!(lines[0], "Documents");
        assert_eq!(lines[1], "001 Hello → /42-hello/");
        assert_eq!(lines[2], "    Source: content/hello.md");
        assert!(lines.contains(&"001 Tags (no listing)".to_string()));
        assert!(lines.contains(&"002 Topics (1 item) → /topics/".to_string()));
        assert!(lines.iter().any(|l| l.starts_with("Routes: ")));
        assert_eq!(lines.last().unwrap(), "Cache: 2 rendered");
    }

    #[test]
    fn publish_report_lines() {
        let report = PublishReport {
            pages: 9,
            assets: 1,
            skipped: 0,
            images_resized: 4,
        };
        let lines = format_publish_report(&report, Path::new("site/publish"));
        assert_eq!(
            lines,
            [
                "Published 10 files to site/publish (9 pages, 1 asset)",
                "Images: 4 resized",
            ]
        );
    }
}
