//! Schema registry for document contexts.
//!
//! A schema answers one question: given a structural address inside a
//! context (`["meta", "gallery", "img", "key"]`), what kind of node is
//! allowed there? Answers come from an ordered list of [`KindResolver`]
//! strategies; the first one that recognises the address wins.
//!
//! Most addresses are fixed and live in a [`FieldTable`]. Taxonomy
//! memberships are keyed by arbitrary slug paths, so they are answered by
//! [`TaxonomyMembershipResolver`], registered alongside the table rather
//! than special-cased inside it.
//!
//! The [`Registry`] is built once per process and passed by reference.

use super::{Context, DocKind};
use crate::metadata::parse_date;
use crate::slug::{is_valid_slug, is_valid_slug_path};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("unknown field '{0}'")]
    Unknown(String),
    #[error("missing required field '{0}'")]
    Missing(String),
    #[error("field '{address}' must be {expected}")]
    Mismatch {
        address: String,
        expected: &'static str,
    },
}

/// Contract for the node found at an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A table whose keys are resolved as child addresses.
    Table,
    /// An array of tables; each element's keys resolve under the same address.
    TableList,
    Text,
    Slug,
    SlugPath,
    /// Integer >= 1.
    PosInt,
    Bool,
    /// String accepted by [`parse_date`].
    Date,
    /// `true` (unordered) or a positive series part.
    TaxonomyItem,
}

impl NodeKind {
    fn expected(self) -> &'static str {
        match self {
            NodeKind::Table => "a table",
            NodeKind::TableList => "an array of tables",
            NodeKind::Text => "a string",
            NodeKind::Slug => "a slug (lowercase letters, digits, hyphens)",
            NodeKind::SlugPath => "a slug path (slugs joined by '/')",
            NodeKind::PosInt => "a positive integer",
            NodeKind::Bool => "a boolean",
            NodeKind::Date => "a date like 2024-03-01 or 2024-03-01-1530",
            NodeKind::TaxonomyItem => "true or a positive part number",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        let pos_int = |v: &Value| v.as_u64().is_some_and(|n| n >= 1);
        match self {
            NodeKind::Table => value.is_object(),
            NodeKind::TableList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_object)),
            NodeKind::Text => value.is_string(),
            NodeKind::Slug => value.as_str().is_some_and(is_valid_slug),
            NodeKind::SlugPath => value.as_str().is_some_and(is_valid_slug_path),
            NodeKind::PosInt => pos_int(value),
            NodeKind::Bool => value.is_boolean(),
            NodeKind::Date => value.as_str().and_then(parse_date).is_some(),
            NodeKind::TaxonomyItem => value.as_bool() == Some(true) || pos_int(value),
        }
    }
}

/// Maps a structural address to the node kind expected there.
pub trait KindResolver: Send + Sync {
    fn resolve(&self, address: &[&str]) -> Option<NodeKind>;
}

/// Fixed addresses, written dotted (`meta.gallery.img`).
pub struct FieldTable {
    fields: Vec<(&'static str, NodeKind)>,
}

impl FieldTable {
    pub fn new(fields: &[(&'static str, NodeKind)]) -> Self {
        Self {
            fields: fields.to_vec(),
        }
    }
}

impl KindResolver for FieldTable {
    fn resolve(&self, address: &[&str]) -> Option<NodeKind> {
        let dotted = address.join(".");
        self.fields
            .iter()
            .find(|(name, _)| *name == dotted)
            .map(|(_, kind)| *kind)
    }
}

/// Any key directly under `meta.taxonomy` is a membership.
pub struct TaxonomyMembershipResolver;

impl KindResolver for TaxonomyMembershipResolver {
    fn resolve(&self, address: &[&str]) -> Option<NodeKind> {
        match address {
            ["meta", "taxonomy", slug_path] if is_valid_slug_path(slug_path) => {
                Some(NodeKind::TaxonomyItem)
            }
            _ => None,
        }
    }
}

/// Resolvers plus required addresses for one document kind.
pub struct Schema {
    resolvers: Vec<Box<dyn KindResolver>>,
    required: Vec<&'static str>,
}

impl Schema {
    pub fn new(resolvers: Vec<Box<dyn KindResolver>>, required: &[&'static str]) -> Self {
        Self {
            resolvers,
            required: required.to_vec(),
        }
    }

    pub fn resolve(&self, address: &[&str]) -> Option<NodeKind> {
        self.resolvers.iter().find_map(|r| r.resolve(address))
    }

    pub fn validate(&self, context: &Context) -> Result<(), SchemaError> {
        let mut address = Vec::new();
        self.validate_table(context, &mut address)?;
        for required in &self.required {
            if lookup(context, required).is_none() {
                return Err(SchemaError::Missing((*required).to_string()));
            }
        }
        Ok(())
    }

    fn validate_table<'a>(
        &self,
        table: &'a serde_json::Map<String, Value>,
        address: &mut Vec<&'a str>,
    ) -> Result<(), SchemaError> {
        for (key, value) in table {
            address.push(key.as_str());
            let kind = self
                .resolve(address)
                .ok_or_else(|| SchemaError::Unknown(address.join(".")))?;
            if !kind.accepts(value) {
                return Err(SchemaError::Mismatch {
                    address: address.join("."),
                    expected: kind.expected(),
                });
            }
            match value {
                Value::Object(child) if kind == NodeKind::Table => {
                    self.validate_table(child, address)?;
                }
                Value::Array(items) if kind == NodeKind::TableList => {
                    for child in items.iter().filter_map(Value::as_object) {
                        self.validate_table(child, address)?;
                    }
                }
                _ => {}
            }
            address.pop();
        }
        Ok(())
    }
}

fn lookup<'a>(context: &'a Context, dotted: &str) -> Option<&'a Value> {
    let mut parts = dotted.split('.');
    let mut current = context.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Schemas for every document kind.
pub struct Registry {
    content: Schema,
    taxonomy: Schema,
}

impl Registry {
    pub fn new(content: Schema, taxonomy: Schema) -> Self {
        Self { content, taxonomy }
    }

    /// The schemas used by the build.
    pub fn standard() -> Self {
        use NodeKind::*;
        let content = Schema::new(
            vec![
                Box::new(FieldTable::new(&[
                    ("meta", Table),
                    ("meta.slug", Slug),
                    ("meta.pk", PosInt),
                    ("meta.date", Date),
                    ("meta.title", Text),
                    ("meta.description", Text),
                    ("meta.lead", Text),
                    ("meta.summary", Text),
                    ("meta.use_template", Text),
                    ("meta.img", Text),
                    ("meta.disable_comments", Bool),
                    ("meta.taxonomy", Table),
                    ("meta.gallery", Table),
                    ("meta.gallery.per_page", PosInt),
                    ("meta.gallery.img", TableList),
                    ("meta.gallery.img.key", Text),
                    ("meta.gallery.img.title", Text),
                    ("meta.gallery.img.description", Text),
                    ("meta.gallery.img.cover", Bool),
                ])),
                Box::new(TaxonomyMembershipResolver),
            ],
            &["meta", "meta.slug"],
        );
        let taxonomy = Schema::new(
            vec![
                Box::new(FieldTable::new(&[
                    ("meta", Table),
                    ("meta.slug", SlugPath),
                    ("meta.title", Text),
                    ("meta.description", Text),
                    ("meta.parent", SlugPath),
                    ("meta.pseudo", Bool),
                    ("meta.gallery", Bool),
                    ("meta.taxonomy", Table),
                ])),
                Box::new(TaxonomyMembershipResolver),
            ],
            &["meta", "meta.slug", "meta.title"],
        );
        Self::new(content, taxonomy)
    }

    pub fn schema(&self, kind: DocKind) -> &Schema {
        match kind {
            DocKind::Content => &self.content,
            DocKind::Taxonomy => &self.taxonomy,
        }
    }

    pub fn resolve(&self, kind: DocKind, address: &[&str]) -> Option<NodeKind> {
        self.schema(kind).resolve(address)
    }

    pub fn validate(&self, kind: DocKind, context: &Context) -> Result<(), SchemaError> {
        self.schema(kind).validate(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> Context {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn resolves_fixed_and_membership_addresses() {
        let registry = Registry::standard();
        assert_eq!(
            registry.resolve(DocKind::Content, &["meta", "slug"]),
            Some(NodeKind::Slug)
        );
        assert_eq!(
            registry.resolve(DocKind::Content, &["meta", "taxonomy", "series/intro"]),
            Some(NodeKind::TaxonomyItem)
        );
        assert_eq!(
            registry.resolve(DocKind::Taxonomy, &["meta", "slug"]),
            Some(NodeKind::SlugPath)
        );
        assert_eq!(registry.resolve(DocKind::Content, &["meta", "colour"]), None);
    }

    #[test]
    fn valid_content_passes() {
        let registry = Registry::standard();
        let c = ctx(json!({
            "meta": {
                "slug": "hello",
                "pk": 3,
                "date": "2020-01-01",
                "taxonomy": { "types/articles": true, "series/x": 1 },
                "gallery": { "img": [ { "key": "a.jpg", "cover": true } ] }
            }
        }));
        registry.validate(DocKind::Content, &c).unwrap();
    }

    #[test]
    fn unknown_field_rejected() {
        let registry = Registry::standard();
        let c = ctx(json!({ "meta": { "slug": "a", "colour": "red" } }));
        assert_eq!(
            registry.validate(DocKind::Content, &c),
            Err(SchemaError::Unknown("meta.colour".into()))
        );
    }

    #[test]
    fn missing_slug_rejected() {
        let registry = Registry::standard();
        let c = ctx(json!({ "meta": { "title": "No slug" } }));
        assert_eq!(
            registry.validate(DocKind::Content, &c),
            Err(SchemaError::Missing("meta.slug".into()))
        );
    }

    #[test]
    fn kind_mismatches_rejected() {
        let registry = Registry::standard();
        for bad in [
            json!({ "meta": { "slug": "Bad_Slug" } }),
            json!({ "meta": { "slug": "a", "pk": 0 } }),
            json!({ "meta": { "slug": "a", "pk": -4 } }),
            json!({ "meta": { "slug": "a", "date": "yesterday" } }),
            json!({ "meta": { "slug": "a", "taxonomy": { "x": false } } }),
            json!({ "meta": { "slug": "a", "taxonomy": { "x": 0 } } }),
            json!({ "meta": { "slug": "a", "gallery": { "img": [ { "key": 3 } ] } } }),
        ] {
            assert!(
                matches!(
                    registry.validate(DocKind::Content, &ctx(bad.clone())),
                    Err(SchemaError::Mismatch { .. })
                ),
                "{bad} should be a mismatch"
            );
        }
    }

    #[test]
    fn taxonomy_requires_title() {
        let registry = Registry::standard();
        let c = ctx(json!({ "meta": { "slug": "topics/rust" } }));
        assert_eq!(
            registry.validate(DocKind::Taxonomy, &c),
            Err(SchemaError::Missing("meta.title".into()))
        );
    }

    #[test]
    fn custom_resolver_extends_schema() {
        struct Extra;
        impl KindResolver for Extra {
            fn resolve(&self, address: &[&str]) -> Option<NodeKind> {
                (address == ["meta", "weight"]).then_some(NodeKind::PosInt)
            }
        }
        let schema = Schema::new(
            vec![
                Box::new(FieldTable::new(&[("meta", NodeKind::Table)])),
                Box::new(Extra),
            ],
            &["meta"],
        );
        schema.validate(&ctx(json!({ "meta": { "weight": 2 } }))).unwrap();
        assert!(schema.validate(&ctx(json!({ "meta": { "height": 2 } }))).is_err());
    }
}
