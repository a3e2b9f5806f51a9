//! Slug syntax.
//!
//! A slug is a single lowercase URL segment: ASCII letters, digits and
//! hyphens, starting and ending with a letter or digit (`my-post`, `2024`,
//! `a`). A slug path is one or more slugs joined with `/`
//! (`topics/rust/async`) and identifies a taxonomy node.

/// Returns true if `s` is a well-formed slug.
pub fn is_valid_slug(s: &str) -> bool {
    let bytes = s.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    let edge = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    edge(first) && edge(last) && bytes.iter().all(|b| edge(b) || *b == b'-')
}

/// Returns true if every `/`-separated segment of `s` is a valid slug.
pub fn is_valid_slug_path(s: &str) -> bool {
    !s.is_empty() && s.split('/').all(is_valid_slug)
}

/// Parent of a slug path: everything but the last segment.
///
/// ```text
/// topics/rust/async -> Some("topics/rust")
/// topics            -> None
/// ```
pub fn parent_path(slug_path: &str) -> Option<&str> {
    slug_path.rsplit_once('/').map(|(parent, _)| parent)
}

/// First segment of a slug path.
pub fn top_level(slug_path: &str) -> &str {
    slug_path.split('/').next().unwrap_or(slug_path)
}

/// Last segment of a slug path.
pub fn leaf(slug_path: &str) -> &str {
    slug_path.rsplit('/').next().unwrap_or(slug_path)
}
