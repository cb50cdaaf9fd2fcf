use crate::constants::{content_type, CONTENT_TYPES_NAMESPACE};
use crate::xml_edit::{escape_attr, parse_document, XML_DECLARATION};
use crate::{PartName, Result};
use std::collections::BTreeMap;

/// The `[Content_Types].xml` table of a package.
///
/// Overrides are keyed by part name, defaults by lower-cased extension. Part
/// name comparison is ASCII case-insensitive as in the packaging conventions.
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    defaults: BTreeMap<String, String>,
    overrides: BTreeMap<String, String>,
}

impl ContentTypes {
    pub fn parse(xml_data: &[u8]) -> Result<Self> {
        let xml_str = std::str::from_utf8(xml_data)?;
        let doc = parse_document(xml_str)?;

        let mut types = ContentTypes::default();
        for node in doc.root_element().children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "Default" => {
                    if let (Some(ext), Some(ct)) = (node.attribute("Extension"), node.attribute("ContentType")) {
                        types.defaults.insert(ext.to_ascii_lowercase(), ct.to_string());
                    }
                }
                "Override" => {
                    if let (Some(name), Some(ct)) = (node.attribute("PartName"), node.attribute("ContentType")) {
                        types.overrides.insert(Self::key(&PartName::new(name)), ct.to_string());
                    }
                }
                _ => {}
            }
        }
        Ok(types)
    }

    fn key(part: &PartName) -> String {
        part.as_str().to_ascii_lowercase()
    }

    /// Content type of a part: its override if present, else the default for its extension.
    pub fn lookup(&self, part: &PartName) -> Option<&str> {
        self.overrides
            .get(&Self::key(part))
            .or_else(|| self.defaults.get(&part.extension()))
            .map(String::as_str)
    }

    pub fn default_for(&self, ext: &str) -> Option<&str> {
        self.defaults.get(&ext.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn set_default(&mut self, ext: &str, content_type: &str) {
        self.defaults.insert(ext.to_ascii_lowercase(), content_type.to_string());
    }

    /// Keeps only the extension defaults; overrides are regenerated from the parts at save time.
    pub fn defaults_only(&self) -> ContentTypes {
        ContentTypes {
            defaults: self.defaults.clone(),
            overrides: BTreeMap::new(),
        }
    }

    /// Serializes the defaults plus one override for every part whose content
    /// type differs from its extension default.
    pub fn write<'a>(&self, parts: impl IntoIterator<Item = (&'a PartName, &'a str)>) -> String {
        let mut defaults = self.defaults.clone();
        defaults
            .entry("rels".to_string())
            .or_insert_with(|| content_type::RELATIONSHIPS.to_string());
        defaults
            .entry("xml".to_string())
            .or_insert_with(|| content_type::XML.to_string());

        let mut xml = String::from(XML_DECLARATION);
        xml.push_str(&format!("<Types xmlns=\"{}\">", CONTENT_TYPES_NAMESPACE));
        for (ext, ct) in &defaults {
            xml.push_str(&format!(
                "<Default Extension=\"{}\" ContentType=\"{}\"/>",
                escape_attr(ext),
                escape_attr(ct)
            ));
        }
        for (part, ct) in parts {
            if defaults.get(&part.extension()).map(String::as_str) == Some(ct) {
                continue;
            }
            xml.push_str(&format!(
                "<Override PartName=\"{}\" ContentType=\"{}\"/>",
                escape_attr(part.as_str()),
                escape_attr(ct)
            ));
        }
        xml.push_str("</Types>");
        xml
    }
}
