//! Minimal HTML scanning helpers for the catalog parser.
//!
//! The platform pages are server-rendered with hashed, versioned class names
//! (`___program-card___abc12`), so elements are located by tag name and class
//! prefix and their contents sliced out with depth counting. This is not a
//! general HTML parser: it assumes well-formed nesting of the element being
//! extracted, which holds for the pages scraped here.

use std::sync::LazyLock;

use regex::Regex;

/// Compiles a regex at static init; panics on invalid pattern.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#,
    )
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?s)<[^>]*>"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\s+"));
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});"));

const VOID_ELEMENTS: [&str; 6] = ["img", "br", "meta", "input", "link", "hr"];

/// One located element: its opening tag and the raw HTML between the tags.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Element<'a> {
    /// The opening tag including angle brackets.
    pub open_tag: &'a str,
    /// Raw inner HTML; empty for void or self-closing elements.
    pub inner: &'a str,
}

impl<'a> Element<'a> {
    /// Returns the decoded value of attribute `name`.
    pub fn attr(&self, name: &str) -> Option<String> {
        attribute(self.open_tag, name)
    }

    /// Returns true when one of the element's classes starts with `prefix`.
    pub fn has_class_prefix(&self, prefix: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c.starts_with(prefix)))
    }

    /// Returns the class token starting with `prefix`, if any.
    pub fn class_with_prefix(&self, prefix: &str) -> Option<String> {
        self.attr("class").and_then(|classes| {
            classes
                .split_whitespace()
                .find(|c| c.starts_with(prefix))
                .map(str::to_string)
        })
    }

    /// Returns the element's text content with tags removed, entities
    /// decoded and whitespace collapsed.
    pub fn text(&self) -> String {
        text_content(self.inner)
    }

    /// Finds the first descendant `tag` whose class starts with `class_prefix`.
    pub fn find(&self, tag: &str, class_prefix: &str) -> Option<Element<'a>> {
        find_first(self.inner, tag, class_prefix)
    }

    /// Finds every descendant `tag` whose class starts with `class_prefix`.
    pub fn find_all(&self, tag: &str, class_prefix: &str) -> Vec<Element<'a>> {
        find_all(self.inner, tag, class_prefix)
    }
}

/// Finds the first `tag` element whose class starts with `class_prefix`.
pub(crate) fn find_first<'a>(html: &'a str, tag: &str, class_prefix: &str) -> Option<Element<'a>> {
    elements(html, tag).find(|element| element.has_class_prefix(class_prefix))
}

/// Finds every `tag` element whose class starts with `class_prefix`, in document order.
pub(crate) fn find_all<'a>(html: &'a str, tag: &str, class_prefix: &str) -> Vec<Element<'a>> {
    elements(html, tag)
        .filter(|element| element.has_class_prefix(class_prefix))
        .collect()
}

/// Finds the first `tag` element whose `id` attribute equals `id`.
pub(crate) fn find_by_id<'a>(html: &'a str, tag: &str, id: &str) -> Option<Element<'a>> {
    elements(html, tag).find(|element| element.attr("id").as_deref() == Some(id))
}

/// Iterates over every `tag` element in `html`, including nested ones.
pub(crate) fn elements<'a>(html: &'a str, tag: &str) -> impl Iterator<Item = Element<'a>> + use<'a> {
    let tag = tag.to_ascii_lowercase();
    let mut cursor = 0;
    std::iter::from_fn(move || {
        let (start, end) = next_open_tag(html, &tag, cursor)?;
        cursor = start + 1;
        let open_tag = &html[start..end];
        let self_closing = open_tag.ends_with("/>");
        let inner = if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
            ""
        } else {
            match inner_span(html, &tag, end) {
                Some(inner_end) => &html[end..inner_end],
                // Unclosed element: take the rest of the document.
                None => &html[end..],
            }
        };
        Some(Element { open_tag, inner })
    })
}

/// Locates the next opening `<tag ...>` at or after `from`; returns its byte span.
fn next_open_tag(html: &str, tag: &str, from: usize) -> Option<(usize, usize)> {
    let mut pos = from;
    while let Some(offset) = html.get(pos..)?.find('<') {
        let start = pos + offset;
        if is_tag_at(html, start + 1, tag) {
            let end = start + html[start..].find('>')? + 1;
            return Some((start, end));
        }
        pos = start + 1;
    }
    None
}

/// Returns true when `html[at..]` begins with `tag` followed by a tag boundary.
fn is_tag_at(html: &str, at: usize, tag: &str) -> bool {
    let Some(rest) = html.get(at..) else {
        return false;
    };
    let Some(name) = rest.get(..tag.len()) else {
        return false;
    };
    if !name.eq_ignore_ascii_case(tag) {
        return false;
    }
    matches!(
        rest[tag.len()..].chars().next(),
        Some(' ' | '\t' | '\n' | '\r' | '>' | '/')
    )
}

/// Finds the byte offset of the `</tag>` matching an element whose content starts at `from`.
fn inner_span(html: &str, tag: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut pos = from;
    while let Some(offset) = html.get(pos..)?.find('<') {
        let at = pos + offset;
        if html[at + 1..].starts_with('/') && is_tag_at(html, at + 2, tag) {
            depth -= 1;
            if depth == 0 {
                return Some(at);
            }
        } else if is_tag_at(html, at + 1, tag) {
            let tag_end = at + html[at..].find('>')?;
            if !html[..tag_end].ends_with('/') {
                depth += 1;
            }
        }
        pos = at + 1;
    }
    None
}

/// Returns the decoded value of attribute `name` within an opening tag.
pub(crate) fn attribute(open_tag: &str, name: &str) -> Option<String> {
    ATTRIBUTE_RE.captures_iter(open_tag).find_map(|caps| {
        let key = caps.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        let raw = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        Some(decode_entities(raw))
    })
}

/// Strips tags, decodes entities and collapses whitespace.
pub(crate) fn text_content(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    let decoded = decode_entities(&stripped);
    WHITESPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}

/// Decodes the named entities the platform emits plus numeric references.
pub(crate) fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    ENTITY_RE
        .replace_all(value, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}
