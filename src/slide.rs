use crate::container::PartKind;
use crate::import::ImportSession;
use crate::package::Package;
use crate::{Error, PartName, Result};
use tracing::debug;

/// Imports one slide into the target and appends it to the slide list.
///
/// The slide's dependencies that are not part of its theme chain (media,
/// charts and their workbooks, diagrams, tags, the notes slide) are copied
/// first, each at most once per source. Listed slides it links to are not
/// copied here; they are imported in their own turn and the link already
/// points at their target name. An unlisted slide reached through a link is
/// copied as a plain dependency.
///
/// # Errors
///
/// [`Error::UnresolvedReference`] if the slide or one of its dependencies
/// refers to something the identity map does not cover. The caller is
/// expected to roll the whole source back.
pub fn import_slide(session: &mut ImportSession, slide: &PartName, target: &mut Package) -> Result<PartName> {
    let name = session
        .map
        .part(slide)
        .cloned()
        .ok_or_else(|| Error::UnresolvedReference {
            part: slide.to_string(),
            reference: slide.to_string(),
        })?;
    let rel_id = session
        .map
        .presentation_rel(slide)
        .ok_or_else(|| Error::UnresolvedReference {
            part: slide.to_string(),
            reference: slide.to_string(),
        })?
        .to_string();

    let listed = |name: &PartName, part: &crate::SourcePart| {
        part.kind == PartKind::Slide && session.graph.slides.iter().any(|(s, _)| s == name)
    };
    let mut order: Vec<PartName> = session
        .graph
        .closure(std::iter::once(slide), listed)
        .into_iter()
        .filter(|part| !session.is_copied(part))
        .cloned()
        .collect();
    // dependencies first, the slide itself last
    if !order.is_empty() {
        order.rotate_left(1);
    }

    let parts: Vec<&PartName> = order.iter().collect();
    let prepared = session.prepare_parts(&parts)?;
    let copied = prepared.len();
    for part in prepared {
        session.commit(part, target)?;
    }

    target.register_slide(&name, &rel_id);
    debug!(slide = %slide, to = %name, parts = copied, "imported slide");
    Ok(name)
}
