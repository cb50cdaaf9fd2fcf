use crate::constants::PACKAGE_RELS_NAMESPACE;
use crate::xml_edit::{escape_attr, parse_document, XML_DECLARATION};
use crate::{Error, PartName, Result};

/// A single relationship from an owning part to a target.
///
/// Internal targets are stored as written in the `.rels` file, i.e. relative
/// to the owner's directory. External targets (hyperlinks, linked media) are
/// URLs and are never resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    /// Absolute part name of an internal target, `None` for external relationships.
    pub fn target_part(&self, owner: &PartName) -> Option<PartName> {
        if self.external {
            None
        } else {
            Some(PartName::resolve(owner, &self.target))
        }
    }
}

/// Parses relationship (`.rels`) XML data.
///
/// # Arguments
///
/// - `xml_data`: Raw relationship XML data as a byte slice.
///
/// # Returns
///
/// Returns a `Result` containing:
/// - `Ok(Vec<Relationship>)`: Every relationship in document order.
/// - `Err(Error)`: If the data isn't valid UTF-8, the XML is malformed or a
///   relationship lacks its `Id`, `Type` or `Target` attribute.
pub fn parse_rels(xml_data: &[u8]) -> Result<Vec<Relationship>> {
    let xml_str = std::str::from_utf8(xml_data)?;
    let doc = parse_document(xml_str)?;
    let root = doc.root_element();

    let mut rels = Vec::new();
    for rel in root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
    {
        let (Some(id), Some(rel_type), Some(target)) = (rel.attribute("Id"), rel.attribute("Type"), rel.attribute("Target")) else {
            return Err(Error::ParseError("relationship without Id, Type or Target"));
        };
        let external = rel
            .attribute("TargetMode")
            .map(|mode| mode.eq_ignore_ascii_case("External"))
            .unwrap_or(false);

        rels.push(Relationship {
            id: id.to_string(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external,
        });
    }

    Ok(rels)
}

/// Serializes relationships into `.rels` XML.
pub fn write_rels(rels: &[Relationship]) -> String {
    let mut xml = String::from(XML_DECLARATION);
    xml.push_str(&format!("<Relationships xmlns=\"{}\">", PACKAGE_RELS_NAMESPACE));
    for rel in rels {
        xml.push_str(&format!(
            "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"",
            escape_attr(&rel.id),
            escape_attr(&rel.rel_type),
            escape_attr(&rel.target)
        ));
        if rel.external {
            xml.push_str(" TargetMode=\"External\"");
        }
        xml.push_str("/>");
    }
    xml.push_str("</Relationships>");
    xml
}

/// Returns `rId{n}` one above the highest numeric id in `rels` and `reserved`.
pub fn next_rel_id<'a>(rels: &'a [Relationship], reserved: impl IntoIterator<Item = &'a String>) -> String {
    let mut highest = 0;
    let ids = rels.iter().map(|r| &r.id).chain(reserved);
    for id in ids {
        if let Some(n) = id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()) {
            highest = highest.max(n);
        }
    }
    format!("rId{}", highest + 1)
}
