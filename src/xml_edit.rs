//! Text-level editing of XML parts.
//!
//! Parts are copied verbatim; the few values that must change (relationship
//! references, layout ids, presentation id lists) are replaced by splicing the
//! original text at the byte ranges roxmltree reports. Everything else,
//! including namespace prefixes, whitespace and extension markup, is kept
//! byte-for-byte.

use crate::constants::{P_NAMESPACE, RELS_NAMESPACE, VML_OFFICE_NAMESPACE};
use crate::{Error, PartName, Result};
use roxmltree::{Attribute, Document, Node};
use std::ops::Range;

pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

/// Removes a leading byte order mark.
pub fn strip_bom(text: &str) -> &str {
    text.trim_start_matches('\u{feff}')
}

/// Parses XML text, ignoring a leading byte order mark.
///
/// Byte ranges reported by the returned document are relative to
/// [`strip_bom`]`(text)`, not to `text`.
pub fn parse_document(text: &str) -> Result<Document<'_>> {
    Ok(Document::parse(strip_bom(text))?)
}

pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// A set of non-overlapping replacements applied to a source text in one pass.
pub struct Splice<'a> {
    text: &'a str,
    edits: Vec<(Range<usize>, String)>,
}

impl<'a> Splice<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, edits: Vec::new() }
    }

    pub fn replace(&mut self, range: Range<usize>, with: impl Into<String>) {
        self.edits.push((range, with.into()));
    }

    pub fn remove(&mut self, range: Range<usize>) {
        self.edits.push((range, String::new()));
    }

    pub fn insert(&mut self, at: usize, with: impl Into<String>) {
        self.edits.push((at..at, with.into()));
    }

    /// Applies all edits. Overlapping edits are a programming error and the
    /// later one is dropped.
    pub fn apply(mut self) -> String {
        self.edits.sort_by_key(|(range, _)| (range.start, range.end));

        let mut out = String::with_capacity(self.text.len());
        let mut cursor = 0;
        for (range, replacement) in self.edits {
            if range.start < cursor {
                debug_assert!(false, "overlapping splice at {:?}", range);
                continue;
            }
            out.push_str(&self.text[cursor..range.start]);
            out.push_str(&replacement);
            cursor = range.end;
        }
        out.push_str(&self.text[cursor..]);
        out
    }
}

/// Whether an attribute holds a relationship id of its part.
///
/// Covers everything in the relationships namespace (`r:id`, `r:embed`,
/// `r:link`, `r:pict`, `r:dm`, ...) and the VML `o:relid` attribute.
pub fn is_reference_attribute(attr: &Attribute) -> bool {
    match attr.namespace() {
        Some(RELS_NAMESPACE) => true,
        Some(VML_OFFICE_NAMESPACE) => attr.name() == "relid",
        _ => false,
    }
}

/// Rewrites every relationship reference in `xml` through `resolve`.
///
/// Empty references are left alone; they are how PowerPoint writes action-only
/// hyperlinks. A reference `resolve` does not know fails the whole part with
/// [`Error::UnresolvedReference`].
pub fn rewrite_references<F>(part: &PartName, xml: &str, resolve: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let body = strip_bom(xml);
    let doc = parse_document(body)?;
    let mut splice = Splice::new(body);

    for node in doc.descendants().filter(|n| n.is_element()) {
        for attr in node.attributes().filter(is_reference_attribute) {
            let value = attr.value();
            if value.is_empty() {
                continue;
            }
            let Some(new_value) = resolve(value) else {
                return Err(Error::UnresolvedReference {
                    part: part.to_string(),
                    reference: value.to_string(),
                });
            };
            if new_value != value {
                splice.replace(attr.range_value(), escape_attr(&new_value));
            }
        }
    }

    Ok(splice.apply())
}

/// Cuts the markup that refers to the relationship ids in `dropped`.
///
/// A reference inside an extension (`ext` of any namespace) takes the whole
/// extension with it, since extension payloads are opaque to readers that do
/// not know them. Any other referencing element is removed on its own.
pub fn remove_references(xml: &str, dropped: &[String]) -> Result<String> {
    let body = strip_bom(xml);
    if dropped.is_empty() {
        return Ok(body.to_string());
    }
    let doc = parse_document(body)?;

    let mut ranges: Vec<Range<usize>> = doc
        .descendants()
        .filter(|n| n.is_element())
        .filter(|n| {
            n.attributes()
                .filter(is_reference_attribute)
                .any(|a| dropped.iter().any(|id| id == a.value()))
        })
        .map(|n| {
            n.ancestors()
                .find(|a| a.is_element() && a.tag_name().name() == "ext")
                .unwrap_or(n)
                .range()
        })
        .collect();
    ranges.sort_by_key(|r| (r.start, std::cmp::Reverse(r.end)));

    let mut splice = Splice::new(body);
    let mut covered = 0;
    for range in ranges {
        if range.start < covered {
            continue;
        }
        covered = range.end;
        splice.remove(range);
    }
    Ok(splice.apply())
}

/// Gives every `p:sldLayoutId` of a slide master a fresh id from `next_id`.
pub fn renumber_layout_ids<F>(xml: &str, mut next_id: F) -> Result<String>
where
    F: FnMut() -> u32,
{
    let body = strip_bom(xml);
    let doc = parse_document(body)?;
    let mut splice = Splice::new(body);

    let layout_ids = doc
        .descendants()
        .filter(|n| is_p_element(n, "sldLayoutId"));
    for node in layout_ids {
        if let Some(attr) = node.attributes().find(|a| a.name() == "id" && a.namespace().is_none()) {
            splice.replace(attr.range_value(), next_id().to_string());
        }
    }

    Ok(splice.apply())
}

pub fn is_p_element(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == Some(P_NAMESPACE)
}

/// The namespace prefix an element was written with, empty for the default namespace.
pub fn element_prefix<'t>(text: &'t str, node: &Node) -> &'t str {
    let start = node.range().start + 1;
    let qname_len = text[start..]
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(0);
    let qname = &text[start..start + qname_len];
    match qname.split_once(':') {
        Some((prefix, _)) => prefix,
        None => "",
    }
}

/// `prefix:local`, or just `local` for the default namespace.
pub fn qualified(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}
