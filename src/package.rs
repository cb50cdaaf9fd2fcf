use crate::constants::{content_type, rel_type, CONTENT_TYPES_PART, PACKAGE_RELS_PART};
use crate::container::PptxContainer;
use crate::content_types::ContentTypes;
use crate::parse_rels::{write_rels, Relationship};
use crate::presentation::{ListEntry, PresentationShell};
use crate::xml_edit::{remove_references, renumber_layout_ids};
use crate::{Error, PartName, Result};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{Seek, Write};
use std::path::Path;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;

/// Package-level relationships that are not carried into the merged output.
/// Document statistics and the thumbnail describe the shell's own slides.
const DROPPED_PACKAGE_RELATIONSHIPS: [&str; 3] = [
    rel_type::DIGITAL_SIGNATURE_ORIGIN,
    rel_type::EXTENDED_PROPERTIES,
    rel_type::THUMBNAIL,
];

/// Presentation relationships the shell keeps.
const SHELL_RELATIONSHIPS: [&str; 4] = [
    rel_type::PRES_PROPS,
    rel_type::VIEW_PROPS,
    rel_type::TABLE_STYLES,
    rel_type::THEME,
];

const FIRST_SLIDE_ID: u32 = 256;
const FIRST_MASTER_ID: u32 = 2_147_483_648;

const BLANK_PRESENTATION: &str = include_str!("default_template/presentation.xml");
const BLANK_MASTER: &str = include_str!("default_template/slideMaster1.xml");
const BLANK_LAYOUT: &str = include_str!("default_template/slideLayout1.xml");
const BLANK_THEME: &str = include_str!("default_template/theme1.xml");

#[derive(Debug, Clone)]
struct Part {
    content_type: String,
    data: Vec<u8>,
}

/// Marks a point [`Package::rollback`] can return to.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    journal: usize,
    slides: usize,
    masters: usize,
    notes_master: bool,
    presentation_rels: usize,
}

/// The merged package being built.
///
/// Holds every part in memory, owns the presentation part's id lists and
/// relationships, and journals additions so a failed source can be taken out
/// again. Parts are never modified once added.
pub struct Package {
    parts: BTreeMap<PartName, Part>,
    /// Case-folded names of `parts` and the presentation part.
    taken: HashSet<String>,
    rels: BTreeMap<PartName, Vec<Relationship>>,
    content_types: ContentTypes,
    presentation_part: PartName,
    shell: PresentationShell,
    masters: Vec<(PartName, ListEntry)>,
    notes_master: Option<(PartName, String)>,
    slides: Vec<(PartName, ListEntry)>,
    journal: Vec<PartName>,
    next_slide_id: u32,
    next_master_id: u32,
}

/// Whether a shell part may bring this relationship along. The shell never
/// carries slides, masters, notes or comments; those only arrive by import.
fn shell_carries(rel: &str) -> bool {
    !matches!(
        rel,
        rel_type::SLIDE
            | rel_type::SLIDE_LAYOUT
            | rel_type::SLIDE_MASTER
            | rel_type::NOTES_SLIDE
            | rel_type::NOTES_MASTER
            | rel_type::HANDOUT_MASTER
            | rel_type::COMMENTS
            | rel_type::COMMENT_AUTHORS
            | rel_type::MODERN_COMMENTS
            | rel_type::MODERN_COMMENT_AUTHORS
    )
}

impl Package {
    fn empty(presentation_part: PartName, shell: PresentationShell, content_types: ContentTypes) -> Self {
        let mut taken = HashSet::new();
        taken.insert(presentation_part.folded());
        Self {
            parts: BTreeMap::new(),
            taken,
            rels: BTreeMap::new(),
            content_types,
            presentation_part,
            shell,
            masters: Vec::new(),
            notes_master: None,
            slides: Vec::new(),
            journal: Vec::new(),
            next_slide_id: FIRST_SLIDE_ID,
            next_master_id: FIRST_MASTER_ID,
        }
    }

    /// Starts a target from the shell of `source`: its presentation part
    /// without slides and masters, the presentation, view and table style
    /// properties, the presentation theme and the package-level parts.
    pub fn from_shell(source: &mut PptxContainer) -> Result<Self> {
        let presentation_part = source.presentation_part().clone();
        let shell = PresentationShell::from_xml(source.presentation_xml())?;
        let mut package = Self::empty(presentation_part.clone(), shell, source.content_types().defaults_only());

        let root = PartName::new("/");
        let mut package_rels = Vec::new();
        for rel in source.package_relationships().to_vec() {
            if DROPPED_PACKAGE_RELATIONSHIPS.contains(&rel.rel_type.as_str()) {
                continue;
            }
            if let Some(target) = rel.target_part(&root) {
                if target != presentation_part {
                    if !source.contains(&target) {
                        continue;
                    }
                    package.copy_shell_part(source, &target)?;
                }
            }
            package_rels.push(rel);
        }
        package.rels.insert(root, package_rels);

        let mut presentation_rels = Vec::new();
        for rel in source.presentation_relationships().to_vec() {
            if !SHELL_RELATIONSHIPS.contains(&rel.rel_type.as_str()) {
                continue;
            }
            if let Some(target) = rel.target_part(&presentation_part) {
                if !source.contains(&target) {
                    continue;
                }
                package.copy_shell_part(source, &target)?;
            }
            presentation_rels.push(rel);
        }
        package.rels.insert(presentation_part, presentation_rels);

        package.journal.clear();
        debug!(parts = package.parts.len(), "created target shell");
        Ok(package)
    }

    /// Starts a target from the built-in blank presentation: a 4:3 slide
    /// size and one master with a single blank layout.
    pub fn blank() -> Result<Self> {
        let presentation_part = PartName::new("/ppt/presentation.xml");
        let shell = PresentationShell::from_xml(BLANK_PRESENTATION)?;
        let mut package = Self::empty(presentation_part.clone(), shell, ContentTypes::default());

        let root = PartName::new("/");
        let theme = PartName::new("/ppt/theme/theme1.xml");
        let master = PartName::new("/ppt/slideMasters/slideMaster1.xml");
        let layout = PartName::new("/ppt/slideLayouts/slideLayout1.xml");
        let link = |id: &str, rel: &str, from: &PartName, to: &PartName| Relationship {
            id: id.to_string(),
            rel_type: rel.to_string(),
            target: to.relative_to(from),
            external: false,
        };

        package.register_master(&master, "rId1");
        let master_xml = renumber_layout_ids(BLANK_MASTER, || package.allocate_master_id())?;
        package.add_part(
            theme.clone(),
            content_type::THEME.to_string(),
            BLANK_THEME.as_bytes().to_vec(),
            Vec::new(),
        )?;
        package.add_part(
            layout.clone(),
            content_type::SLIDE_LAYOUT.to_string(),
            BLANK_LAYOUT.as_bytes().to_vec(),
            vec![link("rId1", rel_type::SLIDE_MASTER, &layout, &master)],
        )?;
        package.add_part(
            master.clone(),
            content_type::SLIDE_MASTER.to_string(),
            master_xml.into_bytes(),
            vec![
                link("rId1", rel_type::SLIDE_LAYOUT, &master, &layout),
                link("rId2", rel_type::THEME, &master, &theme),
            ],
        )?;
        package.add_presentation_rel("rId2", rel_type::THEME, &theme);
        package.rels.insert(
            root,
            vec![Relationship {
                id: "rId1".to_string(),
                rel_type: rel_type::OFFICE_DOCUMENT.to_string(),
                target: presentation_part.member().to_string(),
                external: false,
            }],
        );

        package.journal.clear();
        debug!("created blank target shell");
        Ok(package)
    }

    /// Copies a shell part and everything it relates to, keeping names.
    ///
    /// Relationships to slides, masters, notes and comments are left behind
    /// and the markup using them is cut, so an outline view listing slides
    /// does not pull those slides and their chains into the shell.
    fn copy_shell_part(&mut self, source: &mut PptxContainer, part: &PartName) -> Result<()> {
        let mut pending = vec![part.clone()];
        while let Some(name) = pending.pop() {
            if self.contains(&name) {
                continue;
            }
            let content_type = source
                .content_type(&name)
                .ok_or_else(|| Error::Malformed {
                    part: name.to_string(),
                    reason: "no content type".to_string(),
                })?
                .to_string();
            let (rels, dropped): (Vec<_>, Vec<_>) = source
                .relationships(&name)?
                .into_iter()
                .partition(|r| shell_carries(&r.rel_type));

            let mut data = source.read_part(&name)?;
            if !dropped.is_empty() && content_type::is_xml(&content_type) {
                let ids: Vec<String> = dropped.into_iter().map(|r| r.id).collect();
                data = remove_references(std::str::from_utf8(&data)?, &ids)?.into_bytes();
            }

            for rel in &rels {
                if let Some(target) = rel.target_part(&name) {
                    if source.contains(&target) && target != self.presentation_part {
                        pending.push(target);
                    }
                }
            }
            self.add_part(name, content_type, data, rels)?;
        }
        Ok(())
    }

    /// Whether the name is taken by any part, including the presentation part.
    /// Part names compare ASCII case-insensitively.
    pub fn contains(&self, part: &PartName) -> bool {
        self.taken.contains(&part.folded())
    }

    pub fn part_names(&self) -> impl Iterator<Item = &PartName> {
        std::iter::once(&self.presentation_part).chain(self.parts.keys())
    }

    pub fn part_data(&self, part: &PartName) -> Option<&[u8]> {
        self.parts.get(part).map(|p| p.data.as_slice())
    }

    pub fn part_relationships(&self, part: &PartName) -> &[Relationship] {
        self.rels.get(part).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn presentation_part(&self) -> &PartName {
        &self.presentation_part
    }

    pub fn presentation_relationships(&self) -> &[Relationship] {
        self.part_relationships(&self.presentation_part)
    }

    pub fn content_types(&self) -> &ContentTypes {
        &self.content_types
    }

    /// Adds a part with its relationships.
    ///
    /// # Errors
    ///
    /// [`Error::Malformed`] if the name is already taken.
    pub fn add_part(&mut self, name: PartName, content_type: String, data: Vec<u8>, rels: Vec<Relationship>) -> Result<()> {
        if self.contains(&name) {
            return Err(Error::Malformed {
                part: name.to_string(),
                reason: "part name already used in the target".to_string(),
            });
        }
        if !rels.is_empty() {
            self.rels.insert(name.clone(), rels);
        }
        self.taken.insert(name.folded());
        self.parts.insert(name.clone(), Part { content_type, data });
        self.journal.push(name);
        Ok(())
    }

    /// Adds an extension default if the package has none for `ext`.
    pub fn ensure_default(&mut self, ext: &str, content_type: &str) {
        if !ext.is_empty() && self.content_types.default_for(ext).is_none() {
            self.content_types.set_default(ext, content_type);
        }
    }

    fn add_presentation_rel(&mut self, rel_id: &str, rel_type: &str, target: &PartName) {
        let rel = Relationship {
            id: rel_id.to_string(),
            rel_type: rel_type.to_string(),
            target: target.relative_to(&self.presentation_part),
            external: false,
        };
        self.rels.entry(self.presentation_part.clone()).or_default().push(rel);
    }

    /// Appends a slide master to `sldMasterIdLst`.
    pub fn register_master(&mut self, part: &PartName, rel_id: &str) {
        self.add_presentation_rel(rel_id, rel_type::SLIDE_MASTER, part);
        let id = self.allocate_master_id();
        self.masters.push((part.clone(), ListEntry { id, rel_id: rel_id.to_string() }));
    }

    /// Appends a slide to the end of `sldIdLst`.
    pub fn register_slide(&mut self, part: &PartName, rel_id: &str) {
        self.add_presentation_rel(rel_id, rel_type::SLIDE, part);
        let id = self.next_slide_id;
        self.next_slide_id += 1;
        self.slides.push((part.clone(), ListEntry { id, rel_id: rel_id.to_string() }));
    }

    pub fn register_notes_master(&mut self, part: &PartName, rel_id: &str) {
        self.add_presentation_rel(rel_id, rel_type::NOTES_MASTER, part);
        self.notes_master = Some((part.clone(), rel_id.to_string()));
    }

    /// Master and layout ids share one number space in a presentation.
    pub fn allocate_master_id(&mut self) -> u32 {
        let id = self.next_master_id;
        self.next_master_id += 1;
        id
    }

    pub fn notes_master(&self) -> Option<&PartName> {
        self.notes_master.as_ref().map(|(part, _)| part)
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    pub fn master_count(&self) -> usize {
        self.masters.len()
    }

    pub fn slide_parts(&self) -> impl Iterator<Item = &PartName> {
        self.slides.iter().map(|(part, _)| part)
    }

    /// Slide masters in `sldMasterIdLst` order.
    pub fn master_parts(&self) -> impl Iterator<Item = &PartName> {
        self.masters.iter().map(|(part, _)| part)
    }

    /// Slide width and height in EMU.
    pub fn slide_size(&self) -> (u64, u64) {
        self.shell.slide_size()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            journal: self.journal.len(),
            slides: self.slides.len(),
            masters: self.masters.len(),
            notes_master: self.notes_master.is_some(),
            presentation_rels: self.presentation_relationships().len(),
        }
    }

    /// Removes every part and registration added since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        let removed: Vec<PartName> = self.journal.drain(checkpoint.journal..).collect();
        for name in &removed {
            self.taken.remove(&name.folded());
            self.parts.remove(name);
            self.rels.remove(name);
        }
        self.slides.truncate(checkpoint.slides);
        self.masters.truncate(checkpoint.masters);
        if !checkpoint.notes_master {
            self.notes_master = None;
        }
        if let Some(rels) = self.rels.get_mut(&self.presentation_part) {
            rels.truncate(checkpoint.presentation_rels);
        }
        debug!(parts = removed.len(), "rolled back target");
    }

    /// Renders the presentation part with the current id lists.
    pub fn presentation_xml(&self) -> String {
        let masters: Vec<ListEntry> = self.masters.iter().map(|(_, e)| e.clone()).collect();
        let slides: Vec<ListEntry> = self.slides.iter().map(|(_, e)| e.clone()).collect();
        let notes = self.notes_master.as_ref().map(|(_, rel_id)| rel_id.as_str());
        self.shell.render(&masters, notes, &slides)
    }

    /// Writes the package as a zip archive.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> zip::result::ZipResult<W> {
        let mut zip = zip::ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let content_types = self.content_types.write(
            std::iter::once((&self.presentation_part, content_type::PRESENTATION)).chain(
                self.parts
                    .iter()
                    .map(|(name, part)| (name, part.content_type.as_str())),
            ),
        );
        zip.start_file(PartName::new(CONTENT_TYPES_PART).member(), options)?;
        zip.write_all(content_types.as_bytes())?;

        let root = PartName::new("/");
        zip.start_file(PartName::new(PACKAGE_RELS_PART).member(), options)?;
        zip.write_all(write_rels(self.part_relationships(&root)).as_bytes())?;

        zip.start_file(self.presentation_part.member(), options)?;
        zip.write_all(self.presentation_xml().as_bytes())?;

        let owners: BTreeSet<&PartName> = self.rels.keys().filter(|owner| **owner != root).collect();
        for owner in owners {
            zip.start_file(owner.rels_name().member(), options)?;
            zip.write_all(write_rels(&self.rels[owner]).as_bytes())?;
        }

        for (name, part) in &self.parts {
            zip.start_file(name.member(), options)?;
            zip.write_all(&part.data)?;
        }

        zip.finish()
    }

    /// Saves the package to `path`.
    ///
    /// The archive is written to a temporary file next to `path` and renamed
    /// into place, so a failed save leaves no partial output behind.
    ///
    /// # Errors
    ///
    /// [`Error::Write`] if the file cannot be created, written or renamed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let write_error = |source: std::io::Error| Error::Write {
            path: path.to_path_buf(),
            source,
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = tempfile::Builder::new()
            .prefix(".combine-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(write_error)?;
        self.write_to(temp.as_file_mut())
            .map_err(|e| write_error(std::io::Error::other(e)))?;
        temp.as_file().sync_all().map_err(write_error)?;
        temp.persist(path).map_err(|e| write_error(e.error))?;

        info!(path = %path.display(), slides = self.slides.len(), "saved merged presentation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_package() -> Package {
        let xml = r#"<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><p:sldSz cx="9144000" cy="6858000"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#;
        Package::empty(
            PartName::new("/ppt/presentation.xml"),
            PresentationShell::from_xml(xml).unwrap(),
            ContentTypes::default(),
        )
    }

    #[test]
    fn test_add_part_rejects_duplicates() {
        let mut package = shell_package();
        let name = PartName::new("/ppt/slides/slide1.xml");
        package.add_part(name.clone(), content_type::SLIDE.into(), b"<a/>".to_vec(), Vec::new()).unwrap();
        assert!(package.add_part(name, content_type::SLIDE.into(), Vec::new(), Vec::new()).is_err());
        assert!(package
            .add_part(PartName::new("/ppt/presentation.xml"), content_type::XML.into(), Vec::new(), Vec::new())
            .is_err());
    }

    #[test]
    fn test_names_collide_regardless_of_case() {
        let mut package = shell_package();
        let image = PartName::new("/ppt/media/image1.png");
        package.add_part(image, "image/png".into(), Vec::new(), Vec::new()).unwrap();

        assert!(package.contains(&PartName::new("/ppt/media/IMAGE1.PNG")));
        assert!(package.contains(&PartName::new("/PPT/Presentation.xml")));
        assert!(package
            .add_part(PartName::new("/ppt/Media/Image1.png"), "image/png".into(), Vec::new(), Vec::new())
            .is_err());

        let checkpoint = package.checkpoint();
        let slide = PartName::new("/ppt/slides/Slide1.xml");
        package.add_part(slide, content_type::SLIDE.into(), Vec::new(), Vec::new()).unwrap();
        package.rollback(checkpoint);
        assert!(!package.contains(&PartName::new("/ppt/slides/slide1.xml")));
    }

    #[test]
    fn test_blank_package_has_one_blank_master_chain() {
        let package = Package::blank().unwrap();
        assert_eq!(package.master_count(), 1);
        assert_eq!(package.slide_count(), 0);
        assert_eq!(package.slide_size(), (9_144_000, 6_858_000));

        let master = package.master_parts().next().unwrap().clone();
        let layouts: Vec<&Relationship> = package
            .part_relationships(&master)
            .iter()
            .filter(|r| r.rel_type == rel_type::SLIDE_LAYOUT)
            .collect();
        assert_eq!(layouts.len(), 1);

        let master_xml = std::str::from_utf8(package.part_data(&master).unwrap()).unwrap();
        assert!(master_xml.contains(r#"<p:sldLayoutId id="2147483649""#));
        let xml = package.presentation_xml();
        assert!(xml.contains(r#"<p:sldMasterId id="2147483648" r:id="rId1"/>"#));

        let mut package = package;
        assert_eq!(package.allocate_master_id(), 2_147_483_650);
    }

    #[test]
    fn test_rollback_discards_parts_and_registrations() {
        let mut package = shell_package();
        let kept = PartName::new("/ppt/slides/slide1.xml");
        package.add_part(kept.clone(), content_type::SLIDE.into(), Vec::new(), Vec::new()).unwrap();
        package.register_slide(&kept, "rId1");

        let checkpoint = package.checkpoint();
        let dropped = PartName::new("/ppt/slides/slide2.xml");
        package.add_part(dropped.clone(), content_type::SLIDE.into(), Vec::new(), Vec::new()).unwrap();
        package.register_slide(&dropped, "rId2");
        package.register_notes_master(&PartName::new("/ppt/notesMasters/notesMaster1.xml"), "rId3");
        package.rollback(checkpoint);

        assert!(package.contains(&kept));
        assert!(!package.contains(&dropped));
        assert_eq!(package.slide_count(), 1);
        assert!(package.notes_master().is_none());
        assert_eq!(package.presentation_relationships().len(), 1);
    }

    #[test]
    fn test_ids_are_never_reused_after_rollback() {
        let mut package = shell_package();
        let checkpoint = package.checkpoint();
        package.register_slide(&PartName::new("/ppt/slides/slide1.xml"), "rId1");
        package.rollback(checkpoint);
        package.register_slide(&PartName::new("/ppt/slides/slide1.xml"), "rId1");
        assert!(package.presentation_xml().contains(r#"id="257""#));
    }

    #[test]
    fn test_write_to_produces_readable_archive() {
        let mut package = shell_package();
        let slide = PartName::new("/ppt/slides/slide1.xml");
        let layout_rel = Relationship {
            id: "rId1".into(),
            rel_type: rel_type::SLIDE_LAYOUT.into(),
            target: "../slideLayouts/slideLayout1.xml".into(),
            external: false,
        };
        package.add_part(slide.clone(), content_type::SLIDE.into(), b"<p:sld/>".to_vec(), vec![layout_rel]).unwrap();
        package.register_slide(&slide, "rId2");

        let cursor = package.write_to(std::io::Cursor::new(Vec::new())).unwrap();
        let mut archive = zip::ZipArchive::new(cursor).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains(&"[Content_Types].xml".to_string()));
        assert!(names.contains(&"ppt/slides/_rels/slide1.xml.rels".to_string()));
        assert!(names.contains(&"ppt/_rels/presentation.xml.rels".to_string()));

        let mut presentation = String::new();
        std::io::Read::read_to_string(&mut archive.by_name("ppt/presentation.xml").unwrap(), &mut presentation).unwrap();
        assert!(presentation.contains(r#"<p:sldId id="256" r:id="rId2"/>"#));
    }
}
