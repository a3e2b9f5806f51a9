//! Markdown document source.
//!
//! ```text
//! +++
//! [meta]
//! slug = "hello"
//! pk = 42
//! date = "2024-03-01"
//! title = "Hello"
//!
//! [meta.taxonomy]
//! "types/articles" = true
//! "series/intro" = 1
//! +++
//! Opening paragraph, collected as the summary.
//!
//! <!-- more -->
//!
//! See [the follow-up](pk:43) and ![a photo](photo.jpg?800x600).
//! ```
//!
//! The front matter between `+++` lines is TOML and becomes the context.
//! The body is CommonMark (tables, footnotes, strikethrough). Text before a
//! `<!-- more -->` line is collected as the inline summary. Link targets of
//! the form `pk:N` resolve to that document's url; relative image paths
//! are registered with the image cache, resized to `?WxH` when given.

use super::{
    Collectors, Context, DocKind, DocumentSource, DocumentTree, FOOTNOTE_COLLECTOR, ParseMode,
    ParseRequest, RenderHooks, SUMMARY_COLLECTOR, SourceError,
};
use crate::source::Registry;
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html as md_html};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

const FENCE: &str = "+++";
const MORE_MARKER: &str = "<!-- more -->";

/// Default [`DocumentSource`](super::DocumentSource): TOML front matter + CommonMark.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownSource;

impl MarkdownSource {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentSource for MarkdownSource {
    fn parse(&self, request: &ParseRequest<'_>) -> Result<Box<dyn DocumentTree>, SourceError> {
        let text = fs::read_to_string(request.path).map_err(|source| SourceError::Io {
            path: request.path.to_path_buf(),
            source,
        })?;
        let (front, body) = split_front_matter(&text);
        let mut context = match front {
            Some(front) => parse_front_matter(request.srp, front)?,
            None => Context::new(),
        };
        let body = match request.mode {
            ParseMode::Full => body.to_string(),
            ParseMode::MetaOnly => {
                context.retain(|key, _| key == "meta");
                String::new()
            }
        };
        Ok(Box::new(MarkdownTree {
            srp: request.srp.to_path_buf(),
            kind: request.kind,
            mode: request.mode,
            context,
            collectors: Collectors::new(),
            body,
        }))
    }
}

/// Split `+++` fenced front matter from the body.
fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(rest) = text
        .strip_prefix(FENCE)
        .and_then(|r| r.strip_prefix("\r\n").or_else(|| r.strip_prefix('\n')))
    else {
        return (None, text);
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }
    (None, text)
}

fn parse_front_matter(srp: &Path, front: &str) -> Result<Context, SourceError> {
    let table: toml::Table = toml::from_str(front).map_err(|e| SourceError::FrontMatter {
        srp: srp.to_path_buf(),
        message: e.to_string(),
    })?;
    match toml_to_json(toml::Value::Table(table)) {
        Value::Object(map) => Ok(map),
        _ => Ok(Context::new()),
    }
}

/// Convert TOML to JSON, spelling datetimes as strings.
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

struct MarkdownTree {
    srp: PathBuf,
    kind: DocKind,
    mode: ParseMode,
    context: Context,
    collectors: Collectors,
    body: String,
}

impl MarkdownTree {
    fn meta_str(&self, key: &str) -> Option<&str> {
        self.context.get("meta")?.get(key)?.as_str()
    }

    fn invalid(&self, message: impl Into<String>) -> SourceError {
        SourceError::Invalid {
            srp: self.srp.clone(),
            message: message.into(),
        }
    }

    fn has_more_marker(&self) -> bool {
        self.body.lines().any(|l| l.trim() == MORE_MARKER)
    }

    fn set_meta(&mut self, key: &str, value: String) {
        if let Some(Value::Object(meta)) = self.context.get_mut("meta") {
            meta.insert(key.to_string(), Value::String(value));
        }
    }
}

impl DocumentTree for MarkdownTree {
    fn pre_render(&mut self, registry: &Registry) -> Result<(), SourceError> {
        registry
            .validate(self.kind, &self.context)
            .map_err(|source| SourceError::Schema {
                srp: self.srp.clone(),
                source,
            })?;
        if self.kind == DocKind::Content {
            let meta = self.context.get("meta");
            let has = |key: &str| meta.and_then(|m| m.get(key)).is_some();
            if has("pk") && !has("date") {
                return Err(self.invalid("a document with a pk must declare a date"));
            }
            if self.mode == ParseMode::Full && has("summary") && self.has_more_marker() {
                return Err(self.invalid(format!(
                    "meta.summary and an inline summary ({MORE_MARKER}) are mutually exclusive"
                )));
            }
        }
        Ok(())
    }

    fn render(&mut self, hooks: &mut dyn RenderHooks) -> Result<String, SourceError> {
        if self.mode == ParseMode::MetaOnly {
            return Ok(String::new());
        }
        let mut renderer = Renderer {
            srp: self.srp.clone(),
            hooks,
            footnotes: Vec::new(),
        };
        let body = self.body.replace(MORE_MARKER, "");
        let html = renderer.render(&body)?;
        let footnotes = std::mem::take(&mut renderer.footnotes);
        let inline_summary = match self.body.split_once(MORE_MARKER) {
            Some((before, _)) => Some(renderer.render(before)?),
            None => None,
        };
        let summary = match self.meta_str("summary") {
            Some(text) => Some(renderer.render(text)?),
            None => None,
        };
        let lead = match self.meta_str("lead") {
            Some(text) => Some(renderer.render(text)?),
            None => None,
        };

        if let Some(sum) = &inline_summary {
            self.collectors
                .insert(SUMMARY_COLLECTOR.to_string(), vec![sum.clone()]);
        }
        if !footnotes.is_empty() {
            self.collectors
                .insert(FOOTNOTE_COLLECTOR.to_string(), footnotes);
        }
        if let Some(content) = summary.or(inline_summary) {
            self.set_meta("summary_content", content);
        }
        if let Some(content) = lead {
            self.set_meta("lead_content", content);
        }
        Ok(html)
    }

    fn context(&self) -> &Context {
        &self.context
    }

    fn collectors(&self) -> &Collectors {
        &self.collectors
    }
}

/// Renders markdown fragments, rewriting pk links and image references.
struct Renderer<'a> {
    srp: PathBuf,
    hooks: &'a mut dyn RenderHooks,
    footnotes: Vec<String>,
}

impl Renderer<'_> {
    fn render(&mut self, markdown: &str) -> Result<String, SourceError> {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH;
        let mut events = Vec::new();
        let mut footnote: Option<Vec<Event>> = None;
        for event in Parser::new_ext(markdown, options) {
            let event = self.rewrite(event)?;
            match &event {
                Event::Start(Tag::FootnoteDefinition(_)) => footnote = Some(vec![event.clone()]),
                Event::End(TagEnd::FootnoteDefinition) => {
                    if let Some(mut parts) = footnote.take() {
                        parts.push(event.clone());
                        let mut html = String::new();
                        md_html::push_html(&mut html, parts.into_iter());
                        self.footnotes.push(html);
                    }
                }
                _ => {
                    if let Some(parts) = footnote.as_mut() {
                        parts.push(event.clone());
                    }
                }
            }
            events.push(event);
        }
        let mut html = String::new();
        md_html::push_html(&mut html, events.into_iter());
        Ok(html)
    }

    fn rewrite<'e>(&mut self, event: Event<'e>) -> Result<Event<'e>, SourceError> {
        match event {
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) if dest_url.starts_with("pk:") => {
                let pk: u64 = dest_url.trim_start_matches("pk:").parse().map_err(|_| SourceError::Invalid {
                    srp: self.srp.to_path_buf(),
                    message: format!("malformed pk link '{dest_url}'"),
                })?;
                let url = self.hooks.url_for_pk(pk).ok_or(SourceError::UnknownPk {
                    srp: self.srp.to_path_buf(),
                    pk,
                })?;
                Ok(Event::Start(Tag::Link {
                    link_type,
                    dest_url: CowStr::from(url),
                    title,
                    id,
                }))
            }
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) if is_local(&dest_url) => {
                let (rel, size) = split_size(&dest_url);
                let urls = self
                    .hooks
                    .image(&self.srp, rel, size, size.is_none())
                    .map_err(|message| SourceError::Image {
                        srp: self.srp.to_path_buf(),
                        image: rel.to_string(),
                        message,
                    })?;
                Ok(Event::Start(Tag::Image {
                    link_type,
                    dest_url: CowStr::from(urls.url),
                    title,
                    id,
                }))
            }
            other => Ok(other),
        }
    }
}

/// Relative paths only; absolute urls and site-absolute paths pass through.
fn is_local(dest: &str) -> bool {
    !(dest.is_empty() || dest.starts_with('/') || dest.contains("://") || dest.starts_with("data:"))
}

/// `photo.jpg?800x600` -> (`photo.jpg`, Some((800, 600))).
fn split_size(dest: &str) -> (&str, Option<(u32, u32)>) {
    let Some((path, query)) = dest.split_once('?') else {
        return (dest, None);
    };
    let size = query.split_once('x').and_then(|(w, h)| {
        let w: u32 = w.parse().ok()?;
        let h: u32 = h.parse().ok()?;
        (w > 0 && h > 0).then_some((w, h))
    });
    match size {
        Some(size) => (path, Some(size)),
        None => (dest, None),
    }
}
