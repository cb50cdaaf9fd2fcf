use crate::constants::RELS_NAMESPACE;
use crate::xml_edit::{element_prefix, escape_attr, is_p_element, is_reference_attribute, parse_document, qualified, strip_bom, Splice};
use crate::{Error, Result};
use tracing::warn;

/// Id lists rebuilt from the merged content on every save.
const ID_LISTS: [&str; 4] = ["sldMasterIdLst", "notesMasterIdLst", "handoutMasterIdLst", "sldIdLst"];

/// Presentation-level content that points at slides or at parts the merge does not carry.
const DROPPED: [&str; 4] = ["custShowLst", "embeddedFontLst", "custDataLst", "photoAlbum"];

/// PowerPoint 2010 sections, which list slide ids.
const SECTIONS_EXT_URI: &str = "{521415D9-36F7-43E2-AB2F-B90AF26B5E84}";

const MARKER: char = '\u{0}';

/// Slide size PowerPoint assumes when `p:sldSz` is absent (10 x 7.5 inches).
pub const DEFAULT_SLIDE_SIZE: (u64, u64) = (9_144_000, 6_858_000);

/// One entry of `sldMasterIdLst` or `sldIdLst`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub id: u32,
    pub rel_id: String,
}

/// The presentation part of the target with its id lists cut out.
///
/// Everything else (slide size, default text style, extensions, namespace
/// declarations) is kept as written by the package the shell came from. The
/// lists are written back at their schema position by [`PresentationShell::render`].
#[derive(Debug, Clone)]
pub struct PresentationShell {
    head: String,
    tail: String,
    p_prefix: String,
    r_prefix: Option<String>,
    slide_size: (u64, u64),
}

impl PresentationShell {
    pub fn from_xml(xml: &str) -> Result<Self> {
        let body = strip_bom(xml);
        let doc = parse_document(body)?;
        let root = doc.root_element();
        if !is_p_element(&root, "presentation") {
            return Err(Error::Malformed {
                part: "presentation".to_string(),
                reason: format!("unexpected root element {}", root.tag_name().name()),
            });
        }

        let children: Vec<_> = root.children().filter(|n| n.is_element()).collect();
        let slide_size = children
            .iter()
            .find(|n| is_p_element(n, "sldSz"))
            .and_then(|n| {
                let cx = n.attribute("cx")?.parse().ok()?;
                let cy = n.attribute("cy")?.parse().ok()?;
                Some((cx, cy))
            })
            .unwrap_or(DEFAULT_SLIDE_SIZE);
        let insert_at = children
            .iter()
            .find(|n| ID_LISTS.iter().any(|list| is_p_element(n, list)))
            .or_else(|| children.first())
            .map(|n| n.range().start)
            .ok_or_else(|| Error::Malformed {
                part: "presentation".to_string(),
                reason: "empty presentation element".to_string(),
            })?;

        let mut splice = Splice::new(body);
        splice.insert(insert_at, MARKER.to_string());

        for child in &children {
            let name = child.tag_name().name();
            if ID_LISTS.iter().chain(DROPPED.iter()).any(|list| is_p_element(child, list)) {
                splice.remove(child.range());
            } else if is_p_element(child, "extLst") {
                for ext in child.children().filter(|n| is_p_element(n, "ext")) {
                    let sections = ext.attribute("uri") == Some(SECTIONS_EXT_URI);
                    if sections || has_references(&ext) {
                        splice.remove(ext.range());
                    }
                }
            } else if has_references(child) {
                warn!(element = name, "dropping presentation element that references other parts");
                splice.remove(child.range());
            }
        }

        let text = splice.apply();
        let (head, tail) = text
            .split_once(MARKER)
            .ok_or(Error::ParseError("presentation shell lost its insertion point"))?;

        Ok(Self {
            head: head.to_string(),
            tail: tail.to_string(),
            p_prefix: element_prefix(body, &root).to_string(),
            r_prefix: root.lookup_prefix(RELS_NAMESPACE).map(str::to_string),
            slide_size,
        })
    }

    /// Slide width and height in EMU.
    pub fn slide_size(&self) -> (u64, u64) {
        self.slide_size
    }

    /// Writes the presentation part with the given lists.
    pub fn render(&self, masters: &[ListEntry], notes_master: Option<&str>, slides: &[ListEntry]) -> String {
        let p = |local: &str| qualified(&self.p_prefix, local);
        let (r_id, r_decl) = match &self.r_prefix {
            Some(prefix) => (qualified(prefix, "id"), String::new()),
            None => ("r:id".to_string(), format!(" xmlns:r=\"{}\"", RELS_NAMESPACE)),
        };

        let mut lists = String::new();
        if !masters.is_empty() {
            lists.push_str(&format!("<{}>", p("sldMasterIdLst")));
            for entry in masters {
                lists.push_str(&format!(
                    "<{}{} id=\"{}\" {}=\"{}\"/>",
                    p("sldMasterId"),
                    r_decl,
                    entry.id,
                    r_id,
                    escape_attr(&entry.rel_id)
                ));
            }
            lists.push_str(&format!("</{}>", p("sldMasterIdLst")));
        }
        if let Some(rel_id) = notes_master {
            lists.push_str(&format!(
                "<{}><{}{} {}=\"{}\"/></{}>",
                p("notesMasterIdLst"),
                p("notesMasterId"),
                r_decl,
                r_id,
                escape_attr(rel_id),
                p("notesMasterIdLst")
            ));
        }
        if !slides.is_empty() {
            lists.push_str(&format!("<{}>", p("sldIdLst")));
            for entry in slides {
                lists.push_str(&format!(
                    "<{}{} id=\"{}\" {}=\"{}\"/>",
                    p("sldId"),
                    r_decl,
                    entry.id,
                    r_id,
                    escape_attr(&entry.rel_id)
                ));
            }
            lists.push_str(&format!("</{}>", p("sldIdLst")));
        }

        let mut xml = String::with_capacity(self.head.len() + lists.len() + self.tail.len());
        xml.push_str(&self.head);
        xml.push_str(&lists);
        xml.push_str(&self.tail);
        xml
    }
}

fn has_references(node: &roxmltree::Node) -> bool {
    node.descendants()
        .filter(|n| n.is_element())
        .any(|n| n.attributes().any(|a| is_reference_attribute(&a) && !a.value().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::P_NAMESPACE;
    use std::fs;
    use std::path::PathBuf;

    fn load_xml(filename: &str) -> String {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("tests");
        path.push("test_data");
        path.push("xml");
        path.push(filename);
        fs::read_to_string(path).expect("Unable to read test data file")
    }

    fn child_names(xml: &str) -> Vec<String> {
        let doc = roxmltree::Document::parse(xml).unwrap();
        doc.root_element()
            .children()
            .filter(|n| n.is_element())
            .map(|n| n.tag_name().name().to_string())
            .collect()
    }

    #[test]
    fn test_shell_strips_lists_and_slide_references() {
        let shell = PresentationShell::from_xml(&load_xml("presentation.xml")).unwrap();
        let xml = shell.render(&[], None, &[]);
        assert_eq!(child_names(&xml), vec!["sldSz", "notesSz", "defaultTextStyle", "extLst"]);
        assert!(!xml.contains(SECTIONS_EXT_URI));
        assert!(xml.contains("{EFAFB233-063F-42B5-8137-9DF3F51BA10A}"));
    }

    #[test]
    fn test_render_writes_lists_in_schema_order() {
        let shell = PresentationShell::from_xml(&load_xml("presentation.xml")).unwrap();
        let masters = vec![ListEntry { id: 2147483648, rel_id: "rId1".into() }];
        let slides = vec![
            ListEntry { id: 256, rel_id: "rId5".into() },
            ListEntry { id: 257, rel_id: "rId6".into() },
        ];
        let xml = shell.render(&masters, Some("rId4"), &slides);

        assert_eq!(
            child_names(&xml),
            vec!["sldMasterIdLst", "notesMasterIdLst", "sldIdLst", "sldSz", "notesSz", "defaultTextStyle", "extLst"]
        );

        let doc = roxmltree::Document::parse(&xml).unwrap();
        let slide_ids: Vec<(&str, &str)> = doc
            .descendants()
            .filter(|n| n.tag_name().name() == "sldId" && n.tag_name().namespace() == Some(P_NAMESPACE))
            .map(|n| {
                (
                    n.attribute("id").unwrap(),
                    n.attribute((RELS_NAMESPACE, "id")).unwrap(),
                )
            })
            .collect();
        assert_eq!(slide_ids, vec![("256", "rId5"), ("257", "rId6")]);
    }

    #[test]
    fn test_render_declares_missing_relationship_prefix() {
        let xml = r#"<presentation xmlns="http://schemas.openxmlformats.org/presentationml/2006/main"><sldSz cx="9144000" cy="6858000"/><notesSz cx="6858000" cy="9144000"/></presentation>"#;
        let shell = PresentationShell::from_xml(xml).unwrap();
        let out = shell.render(&[ListEntry { id: 2147483648, rel_id: "rId1".into() }], None, &[]);

        let doc = roxmltree::Document::parse(&out).unwrap();
        let master = doc
            .descendants()
            .find(|n| n.tag_name().name() == "sldMasterId")
            .unwrap();
        assert_eq!(master.attribute((RELS_NAMESPACE, "id")), Some("rId1"));
        assert!(out.starts_with("<presentation"));
    }

    #[test]
    fn test_slide_size_is_read_from_sld_sz() {
        let xml = r#"<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:sldSz cx="12192000" cy="6858000"/></p:presentation>"#;
        assert_eq!(PresentationShell::from_xml(xml).unwrap().slide_size(), (12_192_000, 6_858_000));

        let xml = r#"<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#;
        assert_eq!(PresentationShell::from_xml(xml).unwrap().slide_size(), DEFAULT_SLIDE_SIZE);
    }

    #[test]
    fn test_rejects_non_presentation_root() {
        let xml = r#"<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"/>"#;
        assert!(PresentationShell::from_xml(xml).is_err());
    }
}
