use crate::container::{PptxContainer, SourceGraph};
use crate::identity::IdentityMap;
use crate::package::Package;
use crate::parse_rels::Relationship;
use crate::xml_edit::{remove_references, rewrite_references};
use crate::{Error, PartName, Result};
use rayon::prelude::*;
use std::collections::HashSet;

/// A source part translated into target names, ready to be added.
#[derive(Debug)]
pub struct PreparedPart {
    pub source: PartName,
    pub name: PartName,
    pub content_type: String,
    pub data: Vec<u8>,
    pub rels: Vec<Relationship>,
}

/// Everything needed while one source is imported: the open source package,
/// its dependency graph and identity map, and the set of parts already copied.
///
/// Dropping the session closes the source.
pub struct ImportSession {
    source: PptxContainer,
    pub graph: SourceGraph,
    pub map: IdentityMap,
    copied: HashSet<PartName>,
    parallel: bool,
}

impl ImportSession {
    pub fn new(source: PptxContainer, graph: SourceGraph, map: IdentityMap, parallel: bool) -> Self {
        Self {
            source,
            graph,
            map,
            copied: HashSet::new(),
            parallel,
        }
    }

    /// Whether the part has been copied or is served by a part the target already had.
    pub fn is_copied(&self, part: &PartName) -> bool {
        self.copied.contains(part) || self.map.is_rebound(part)
    }

    /// Reads and translates the given parts, skipping parts already copied.
    ///
    /// Reading is sequential. Translation is pure and runs on the rayon pool
    /// when the session is parallel. Results keep the order of `parts`.
    pub fn prepare_parts(&mut self, parts: &[&PartName]) -> Result<Vec<PreparedPart>> {
        let mut raw = Vec::with_capacity(parts.len());
        for &part in parts {
            if self.is_copied(part) {
                continue;
            }
            if !self.graph.parts.contains_key(part) {
                return Err(Error::UnresolvedReference {
                    part: part.to_string(),
                    reference: part.to_string(),
                });
            }
            let data = self.source.read_part(part)?;
            raw.push((part.clone(), data));
        }

        let graph = &self.graph;
        let map = &self.map;
        if self.parallel {
            raw.into_par_iter()
                .map(|(part, data)| prepare_part(graph, map, part, data))
                .collect()
        } else {
            raw.into_iter()
                .map(|(part, data)| prepare_part(graph, map, part, data))
                .collect()
        }
    }

    /// Adds a prepared part to the target.
    pub fn commit(&mut self, prepared: PreparedPart, target: &mut Package) -> Result<()> {
        if self.copied.contains(&prepared.source) {
            return Ok(());
        }
        if !crate::content_type::is_xml(&prepared.content_type) {
            target.ensure_default(&prepared.name.extension(), &prepared.content_type);
        }
        target.add_part(prepared.name, prepared.content_type, prepared.data, prepared.rels)?;
        self.copied.insert(prepared.source);
        Ok(())
    }
}

/// Translates one source part: every internal relationship is pointed at the
/// target name of its target part, markup using a dropped relationship is cut,
/// and every remaining reference in the XML is checked against (and rewritten
/// through) the part's relationship ids.
fn prepare_part(graph: &SourceGraph, map: &IdentityMap, source: PartName, data: Vec<u8>) -> Result<PreparedPart> {
    let part = graph.parts.get(&source).ok_or_else(|| Error::UnresolvedReference {
        part: source.to_string(),
        reference: source.to_string(),
    })?;
    let name = map
        .part(&source)
        .cloned()
        .ok_or_else(|| Error::UnresolvedReference {
            part: source.to_string(),
            reference: source.to_string(),
        })?;

    let mut rels = Vec::with_capacity(part.relationships.len());
    for rel in &part.relationships {
        let id = map
            .relationship(&source, &rel.id)
            .ok_or_else(|| Error::UnresolvedReference {
                part: source.to_string(),
                reference: rel.id.clone(),
            })?
            .to_string();

        let target = match rel.target_part(&source) {
            None => rel.target.clone(),
            Some(target_part) => map
                .part(&target_part)
                .ok_or_else(|| Error::UnresolvedReference {
                    part: source.to_string(),
                    reference: rel.target.clone(),
                })?
                .relative_to(&name),
        };

        rels.push(Relationship {
            id,
            rel_type: rel.rel_type.clone(),
            target,
            external: rel.external,
        });
    }

    let data = if part.kind.is_xml() {
        let text = std::str::from_utf8(&data)?;
        let text = remove_references(text, &part.dropped)?;
        rewrite_references(&source, &text, |id| map.relationship(&source, id).map(str::to_string))?.into_bytes()
    } else {
        data
    };

    Ok(PreparedPart {
        source,
        name,
        content_type: part.content_type.clone(),
        data,
        rels,
    })
}
