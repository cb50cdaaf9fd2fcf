use crate::container::{PartKind, SourceGraph};
use crate::import::ImportSession;
use crate::package::Package;
use crate::xml_edit::renumber_layout_ids;
use crate::{Error, PartName, Result};
use tracing::debug;

/// The master/layout/theme chain of one source, and its notes master chain.
///
/// A chain is always copied as a whole into fresh target parts. Chains of
/// different sources are never compared or shared, so every slide in the
/// target reaches only the chain copied for its own source.
#[derive(Debug, Default)]
pub struct ThemeChain {
    masters: Vec<PartName>,
    parts: Vec<PartName>,
    notes_master: Option<PartName>,
}

impl ThemeChain {
    /// Collects the masters the source lists (then any further master its
    /// slides use) and everything reachable from them that is not a slide.
    pub fn plan(graph: &SourceGraph) -> Self {
        let mut masters: Vec<PartName> = graph.masters.iter().map(|(part, _)| part.clone()).collect();
        for (name, part) in &graph.parts {
            if part.kind == PartKind::SlideMaster && !masters.contains(name) {
                masters.push(name.clone());
            }
        }
        masters.retain(|master| graph.parts.contains_key(master));

        let not_chain = |_: &PartName, part: &crate::SourcePart| {
            matches!(part.kind, PartKind::Slide | PartKind::NotesSlide)
        };

        let mut parts: Vec<PartName> = graph
            .closure(masters.iter(), not_chain)
            .into_iter()
            .cloned()
            .collect();

        let notes_master = graph
            .notes_master
            .as_ref()
            .filter(|notes| graph.parts.contains_key(*notes))
            .cloned();
        if let Some(notes) = &notes_master {
            for part in graph.closure(std::iter::once(notes), not_chain) {
                if !parts.contains(part) {
                    parts.push(part.clone());
                }
            }
        }

        Self {
            masters,
            parts,
            notes_master,
        }
    }

    pub fn masters(&self) -> &[PartName] {
        &self.masters
    }

    pub fn notes_master(&self) -> Option<&PartName> {
        self.notes_master.as_ref()
    }

    pub fn parts(&self) -> &[PartName] {
        &self.parts
    }
}

/// Copies the source's chain into the target as a new, independent chain and
/// registers its masters (and notes master, if the target had none).
///
/// Layout ids inside each copied master are renumbered, since master and
/// layout ids must be unique across the whole presentation.
pub fn isolate_chain(session: &mut ImportSession, chain: &ThemeChain, target: &mut Package) -> Result<()> {
    let parts: Vec<&PartName> = chain.parts().iter().collect();
    let prepared = session.prepare_parts(&parts)?;

    for mut part in prepared {
        if chain.masters.contains(&part.source) {
            let text = std::str::from_utf8(&part.data)?;
            part.data = renumber_layout_ids(text, || target.allocate_master_id())?.into_bytes();
        }
        session.commit(part, target)?;
    }

    for master in &chain.masters {
        let (name, rel_id) = registration(session, master)?;
        target.register_master(&name, &rel_id);
    }
    if let Some(notes) = &chain.notes_master {
        let (name, rel_id) = registration(session, notes)?;
        target.register_notes_master(&name, &rel_id);
    }

    debug!(
        masters = chain.masters.len(),
        parts = chain.parts.len(),
        "isolated theme chain"
    );
    Ok(())
}

fn registration(session: &ImportSession, source: &PartName) -> Result<(PartName, String)> {
    let unresolved = || Error::UnresolvedReference {
        part: source.to_string(),
        reference: source.to_string(),
    };
    let name = session.map.part(source).cloned().ok_or_else(unresolved)?;
    let rel_id = session.map.presentation_rel(source).ok_or_else(unresolved)?.to_string();
    Ok((name, rel_id))
}
