//! Collision-free naming of imported parts.

use crate::container::SourceGraph;
use crate::package::Package;
use crate::parse_rels::next_rel_id;
use crate::theme::ThemeChain;
use crate::PartName;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Generates replacement part names for one merge run.
///
/// Counters are kept per directory, stem and extension and only ever grow, so
/// names handed out earlier in the run are never produced again and the result
/// depends only on the order sources and parts are processed in.
#[derive(Debug, Default)]
pub struct PartNamer {
    counters: HashMap<(String, String, String), u32>,
}

impl PartNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `original` if `taken` rejects it, otherwise the next free
    /// `stem{n}.ext` in the same directory.
    pub fn assign<F>(&mut self, original: &PartName, taken: F) -> PartName
    where
        F: Fn(&PartName) -> bool,
    {
        if !taken(original) {
            return original.clone();
        }

        let (stem, _, ext) = original.split_index();
        let key = (original.directory().to_string(), stem.to_string(), ext.to_string());
        let counter = self.counters.entry(key).or_insert(0);
        loop {
            *counter += 1;
            let candidate = original.with_index(stem, *counter, ext);
            if !taken(&candidate) {
                return candidate;
            }
        }
    }
}

/// Translation of one source's part names and relationship ids into the target.
///
/// Built fresh for every source and dropped once its slides are imported.
#[derive(Debug, Default)]
pub struct IdentityMap {
    parts: BTreeMap<PartName, PartName>,
    relationships: HashMap<PartName, HashMap<String, String>>,
    presentation_rels: BTreeMap<PartName, String>,
    rebound: BTreeSet<PartName>,
}

impl IdentityMap {
    /// Target name of a source part.
    pub fn part(&self, source: &PartName) -> Option<&PartName> {
        self.parts.get(source)
    }

    /// Target id of relationship `id` owned by source part `owner`.
    pub fn relationship(&self, owner: &PartName, id: &str) -> Option<&str> {
        self.relationships
            .get(owner)
            .and_then(|ids| ids.get(id))
            .map(String::as_str)
    }

    /// Target presentation relationship id for a source slide, master or notes master.
    pub fn presentation_rel(&self, source: &PartName) -> Option<&str> {
        self.presentation_rels.get(source).map(String::as_str)
    }

    /// Whether the source part is bound to a part that already existed in the
    /// target instead of being copied.
    pub fn is_rebound(&self, source: &PartName) -> bool {
        self.rebound.contains(source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PartName, &PartName)> {
        self.parts.iter()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Computes the identity map for importing `graph` into `target`.
///
/// Every part of the graph gets a target name that is unused in the target
/// and in the map itself, ignoring ASCII case; names that are free are kept.
/// Relationship ids of copied parts keep their values because each copied
/// part brings its own relationship namespace. Presentation-level relationships, which share the
/// target presentation's namespace, get fresh ids.
///
/// A notes master left out of the graph is rebound to the target's notes
/// master when there is one.
pub fn remap(graph: &SourceGraph, chain: &ThemeChain, target: &Package, namer: &mut PartNamer) -> IdentityMap {
    let mut map = IdentityMap::default();
    let mut assigned: HashSet<String> = HashSet::new();

    for (name, part) in &graph.parts {
        let new_name = namer.assign(name, |candidate| {
            target.contains(candidate) || assigned.contains(&candidate.folded())
        });
        if new_name != *name {
            debug!(from = %name, to = %new_name, "renamed part");
        }
        assigned.insert(new_name.folded());
        map.parts.insert(name.clone(), new_name);

        let ids = part
            .relationships
            .iter()
            .map(|rel| (rel.id.clone(), rel.id.clone()))
            .collect();
        map.relationships.insert(name.clone(), ids);
    }

    if let (Some(source_notes), Some(target_notes)) = (&graph.notes_master, target.notes_master()) {
        if !graph.parts.contains_key(source_notes) {
            debug!(from = %source_notes, to = %target_notes, "rebound notes master");
            map.parts.insert(source_notes.clone(), target_notes.clone());
            map.rebound.insert(source_notes.clone());
        }
    }

    let registered = chain
        .masters()
        .iter()
        .chain(chain.notes_master())
        .chain(graph.slides.iter().map(|(slide, _)| slide));
    let mut reserved: Vec<String> = Vec::new();
    for source in registered {
        let rel_id = next_rel_id(target.presentation_relationships(), &reserved);
        reserved.push(rel_id.clone());
        map.presentation_rels.insert(source.clone(), rel_id);
    }

    map
}
