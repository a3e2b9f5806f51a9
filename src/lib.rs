//! # Sitewright
//!
//! An incremental build engine for static sites whose structure comes from a
//! taxonomy: documents declare which taxonomy nodes they belong to (and,
//! for series, which part they are), and the engine derives every listing,
//! archive, gallery and redirect from those memberships.
//!
//! # Architecture: Phased Build
//!
//! A build is a fixed sequence of phases over one site directory. Each phase
//! finishes before the next starts and the first error stops the build:
//!
//! ```text
//! scan      content/, taxonomy/, theme/static/  →  SiteFiles
//! route     phases 1-12                         →  Site (endpoints + route table)
//! publish   phase 13                            →  publish/
//! ```
//!
//! Rendering is the expensive part, so it goes through the `_wisdom` cache:
//! a document is parsed and rendered again only when its modification time
//! changed. Routing itself is cheap and always runs in full, which keeps url
//! collisions, series gaps and dangling memberships impossible to miss.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Finds documents, taxonomy nodes, subsite configs, static assets and gallery images |
//! | [`source`] | Document parsing behind the [`source::DocumentSource`] trait, plus the meta schema registry |
//! | [`cache`] | The `_wisdom` cache: rendered bodies, image variants, asset fingerprints, configs |
//! | [`taxonomy`] | The taxonomy graph: parents, children, memberships, gallery and pseudo flags |
//! | [`resolver`] | Slug map, PK lookup and url components, including subsites |
//! | [`endpoint`] | Endpoints: one addressable page, redirect or asset each |
//! | [`store`] | Ordered endpoint collections: date and series ordering, topic filtering |
//! | [`paginator`] | Listing pages and sparse page links |
//! | [`router`] | Build phases 1-12 and the route table |
//! | [`generate`] | Phase 13: writes the route table to `publish/` |
//! | [`theme`] | The built-in maud templates behind [`theme::TemplateRenderer`] |
//! | [`imaging`] | Image resizing behind [`imaging::ImageBackend`] |
//! | [`config`] | `config.toml` loading, validation and merging for sites and subsites |
//! | [`metadata`] | Typed views of a document's `meta` table |
//! | [`slug`] | Slug and slug-path syntax |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Arena Endpoints
//!
//! Listings, redirects and navigation links point at other endpoints. All
//! endpoints live in one [`endpoint::Endpoints`] arena and refer to each
//! other by [`endpoint::EndpointId`], so page chains and prev/next links
//! need no shared ownership.
//!
//! ## PK Urls
//!
//! A document with a PK is served at `/<pk>-<slug>/` and `/<pk>/` redirects
//! there. Renaming the slug changes the canonical url, but links of the
//! form `pk:42` and the short `/42/` url keep working.
//!
//! ## Maud Templates
//!
//! The built-in theme is compile-time checked [maud](https://maud.lambda.xyz/)
//! markup. Other renderers plug in through [`theme::TemplateRenderer`].

pub mod cache;
pub mod config;
pub mod endpoint;
pub mod generate;
pub mod imaging;
pub mod metadata;
pub mod output;
pub mod paginator;
pub mod resolver;
pub mod router;
pub mod scan;
pub mod slug;
pub mod source;
pub mod store;
pub mod taxonomy;
pub mod theme;

#[cfg(test)]
pub(crate) mod test_helpers;
