use crate::constants::{content_type, rel_type, CONTENT_TYPES_PART, PACKAGE_RELS_PART};
use crate::content_types::ContentTypes;
use crate::parse_rels::{parse_rels, Relationship};
use crate::xml_edit::{is_p_element, parse_document};
use crate::{Error, PartName, Result};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read-only view of a PowerPoint (pptx) package on disk.
///
/// `PptxContainer` validates the package structure on open and then serves
/// parts and relationships lazily from the zip archive. Dropping the container
/// closes the file, so a merge only ever holds one source open.
pub struct PptxContainer {
    path: PathBuf,
    archive: zip::ZipArchive<File>,
    members: HashMap<String, String>,
    content_types: ContentTypes,
    package_rels: Vec<Relationship>,
    presentation_part: PartName,
    presentation_rels: Vec<Relationship>,
    presentation_xml: String,
    /// Slides in presentation order, each with the id of its presentation relationship.
    slides: Vec<(PartName, String)>,
    masters: Vec<(PartName, String)>,
    pub slide_paths: Vec<PartName>,
    pub slide_count: u32,
}

impl PptxContainer {
    /// Opens a pptx file and validates its package structure.
    ///
    /// # Arguments
    ///
    /// - `path`: Path to the PPTX file.
    ///
    /// # Errors
    ///
    /// - [`Error::NotAPresentation`] if the main document is not a presentation.
    /// - [`Error::UnreadablePackage`] for everything else: a missing file,
    ///   corrupt zip structure, missing `[Content_Types].xml`, package
    ///   relationships or presentation part, or malformed XML in any of them.
    pub fn open(path: &Path) -> Result<Self> {
        match Self::open_package(path) {
            Ok(container) => Ok(container),
            Err(e @ Error::NotAPresentation { .. }) => Err(e),
            Err(e) => Err(Error::UnreadablePackage {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    fn open_package(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let archive = zip::ZipArchive::new(file)?;

        let members = archive
            .file_names()
            .map(|name| (name.to_ascii_lowercase(), name.to_string()))
            .collect();

        let mut container = Self {
            path: path.to_path_buf(),
            archive,
            members,
            content_types: ContentTypes::default(),
            package_rels: Vec::new(),
            presentation_part: PartName::new("/ppt/presentation.xml"),
            presentation_rels: Vec::new(),
            presentation_xml: String::new(),
            slides: Vec::new(),
            masters: Vec::new(),
            slide_paths: Vec::new(),
            slide_count: 0,
        };

        let types_xml = container.read_part(&PartName::new(CONTENT_TYPES_PART))?;
        container.content_types = ContentTypes::parse(&types_xml)?;

        let package_rels = container.read_part(&PartName::new(PACKAGE_RELS_PART))?;
        container.package_rels = parse_rels(&package_rels)?;

        let root = PartName::new("/");
        let main_part = container
            .package_rels
            .iter()
            .find(|r| r.rel_type == rel_type::OFFICE_DOCUMENT && !r.external)
            .and_then(|r| r.target_part(&root))
            .ok_or(Error::ParseError("no officeDocument relationship"))?;

        let main_type = container.content_types.lookup(&main_part).unwrap_or_default();
        if !content_type::PRESENTATION_MAIN_TYPES.contains(&main_type) {
            return Err(Error::NotAPresentation {
                path: path.to_path_buf(),
                content_type: main_type.to_string(),
            });
        }
        container.presentation_part = main_part;

        let xml = container.read_part(&container.presentation_part.clone())?;
        container.presentation_xml = String::from_utf8(xml).map_err(|e| e.utf8_error())?;
        container.presentation_rels = container.relationships(&container.presentation_part.clone())?;

        let (slides, masters) = container.parse_presentation_lists()?;
        container.slide_paths = slides.iter().map(|(part, _)| part.clone()).collect();
        container.slide_count = slides.len() as u32;
        container.slides = slides;
        container.masters = masters;

        debug!(
            path = %path.display(),
            slides = container.slide_count,
            masters = container.masters.len(),
            "opened package"
        );
        Ok(container)
    }

    /// Reads the slide and master id lists of the presentation part, resolving
    /// each entry through the presentation relationships.
    fn parse_presentation_lists(&self) -> Result<(Vec<(PartName, String)>, Vec<(PartName, String)>)> {
        let doc = parse_document(&self.presentation_xml)?;
        let root = doc.root_element();
        let by_id: HashMap<&str, &Relationship> =
            self.presentation_rels.iter().map(|r| (r.id.as_str(), r)).collect();

        let resolve_list = |list: &str, entry: &str| -> Result<Vec<(PartName, String)>> {
            let mut parts = Vec::new();
            let entries = root
                .children()
                .filter(|n| is_p_element(n, list))
                .flat_map(|n| n.children())
                .filter(|n| is_p_element(n, entry));
            for node in entries {
                let rel_id = node
                    .attributes()
                    .find(|a| a.name() == "id" && a.namespace() == Some(crate::constants::RELS_NAMESPACE))
                    .map(|a| a.value())
                    .ok_or(Error::ParseError("presentation list entry without r:id"))?;
                let part = by_id
                    .get(rel_id)
                    .and_then(|r| r.target_part(&self.presentation_part))
                    .ok_or_else(|| Error::UnresolvedReference {
                        part: self.presentation_part.to_string(),
                        reference: rel_id.to_string(),
                    })?;
                parts.push((part, rel_id.to_string()));
            }
            Ok(parts)
        };

        let slides = resolve_list("sldIdLst", "sldId")?;
        let masters = resolve_list("sldMasterIdLst", "sldMasterId")?;
        Ok((slides, masters))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_types(&self) -> &ContentTypes {
        &self.content_types
    }

    pub fn content_type(&self, part: &PartName) -> Option<&str> {
        self.content_types.lookup(part)
    }

    pub fn package_relationships(&self) -> &[Relationship] {
        &self.package_rels
    }

    pub fn presentation_part(&self) -> &PartName {
        &self.presentation_part
    }

    pub fn presentation_relationships(&self) -> &[Relationship] {
        &self.presentation_rels
    }

    pub fn presentation_xml(&self) -> &str {
        &self.presentation_xml
    }

    /// Slide masters in `sldMasterIdLst` order.
    pub fn master_paths(&self) -> impl Iterator<Item = &PartName> {
        self.masters.iter().map(|(part, _)| part)
    }

    pub fn contains(&self, part: &PartName) -> bool {
        self.members.contains_key(&part.member().to_ascii_lowercase())
    }

    /// Reads a part from the archive by its part name.
    ///
    /// # Errors
    ///
    /// [`Error::Malformed`] if the package has no such part, zip and I/O errors
    /// if the member cannot be inflated.
    pub fn read_part(&mut self, part: &PartName) -> Result<Vec<u8>> {
        let member = self
            .members
            .get(&part.member().to_ascii_lowercase())
            .ok_or_else(|| Error::Malformed {
                part: part.to_string(),
                reason: "missing from package".to_string(),
            })?;
        let mut file = self.archive.by_name(member)?;
        let mut content = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Relationships owned by a part; a part without a `.rels` file has none.
    pub fn relationships(&mut self, part: &PartName) -> Result<Vec<Relationship>> {
        let rels_name = part.rels_name();
        if !self.contains(&rels_name) {
            return Ok(Vec::new());
        }
        let data = self.read_part(&rels_name)?;
        parse_rels(&data)
    }

    /// Collects every part reachable from the slides and slide masters.
    ///
    /// Relationships the merge does not carry (comments, comment authors and,
    /// depending on `options`, notes) are removed from the returned parts and
    /// their ids listed in [`SourcePart::dropped`].
    /// Targets missing from the archive stay referenced but get no entry.
    pub fn graph(&mut self, options: &GraphOptions) -> Result<SourceGraph> {
        let mut graph = SourceGraph {
            slides: self.slides.clone(),
            masters: self.masters.clone(),
            notes_master: None,
            parts: BTreeMap::new(),
        };

        let mut queue: VecDeque<PartName> = self
            .slides
            .iter()
            .chain(self.masters.iter())
            .map(|(part, _)| part.clone())
            .collect();

        while let Some(part) = queue.pop_front() {
            if graph.parts.contains_key(&part) {
                continue;
            }

            let content_type = self
                .content_type(&part)
                .ok_or_else(|| Error::Malformed {
                    part: part.to_string(),
                    reason: "no content type".to_string(),
                })?
                .to_string();

            let (relationships, dropped): (Vec<_>, Vec<_>) = self
                .relationships(&part)?
                .into_iter()
                .partition(|r| options.carries(&r.rel_type));

            for rel in &relationships {
                let Some(target) = rel.target_part(&part) else {
                    continue;
                };
                if target == self.presentation_part || !self.contains(&target) {
                    continue;
                }
                if rel.rel_type == rel_type::NOTES_MASTER {
                    graph.notes_master = Some(target.clone());
                    if !options.follow_notes_master {
                        continue;
                    }
                }
                if !graph.parts.contains_key(&target) {
                    queue.push_back(target);
                }
            }

            graph.parts.insert(
                part,
                SourcePart {
                    kind: PartKind::classify(&content_type),
                    content_type,
                    relationships,
                    dropped: dropped.into_iter().map(|r| r.id).collect(),
                },
            );
        }

        Ok(graph)
    }
}

/// Controls which relationships [`PptxContainer::graph`] follows.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    pub include_notes: bool,
    /// Whether the source's notes master chain is part of the graph. When the
    /// target already has a notes master the source's one is rebound instead.
    pub follow_notes_master: bool,
}

impl GraphOptions {
    fn carries(&self, rel: &str) -> bool {
        match rel {
            rel_type::COMMENTS
            | rel_type::COMMENT_AUTHORS
            | rel_type::MODERN_COMMENTS
            | rel_type::MODERN_COMMENT_AUTHORS => false,
            rel_type::NOTES_SLIDE => self.include_notes,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Slide,
    SlideLayout,
    SlideMaster,
    Theme,
    NotesSlide,
    NotesMaster,
    Xml,
    Binary,
}

impl PartKind {
    pub fn classify(ct: &str) -> Self {
        match ct {
            content_type::SLIDE => PartKind::Slide,
            content_type::SLIDE_LAYOUT => PartKind::SlideLayout,
            content_type::SLIDE_MASTER => PartKind::SlideMaster,
            content_type::THEME => PartKind::Theme,
            content_type::NOTES_SLIDE => PartKind::NotesSlide,
            content_type::NOTES_MASTER => PartKind::NotesMaster,
            other if content_type::is_xml(other) => PartKind::Xml,
            _ => PartKind::Binary,
        }
    }

    pub fn is_xml(self) -> bool {
        self != PartKind::Binary
    }
}

#[derive(Debug, Clone)]
pub struct SourcePart {
    pub content_type: String,
    pub kind: PartKind,
    pub relationships: Vec<Relationship>,
    /// Ids of relationships left behind; markup using them is cut on import.
    pub dropped: Vec<String>,
}

/// The dependency-reachable part set of one source package.
#[derive(Debug)]
pub struct SourceGraph {
    /// Slides in presentation order with their presentation relationship ids.
    pub slides: Vec<(PartName, String)>,
    pub masters: Vec<(PartName, String)>,
    /// The notes master the source's notes slides use, followed or not.
    pub notes_master: Option<PartName>,
    pub parts: BTreeMap<PartName, SourcePart>,
}

impl SourceGraph {
    /// Every part reachable from `roots` without passing through `stop`.
    pub fn closure<'a, F>(&'a self, roots: impl IntoIterator<Item = &'a PartName>, stop: F) -> Vec<&'a PartName>
    where
        F: Fn(&PartName, &SourcePart) -> bool,
    {
        let mut seen = std::collections::BTreeSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<&PartName> = roots.into_iter().collect();

        while let Some(name) = queue.pop_front() {
            let Some((key, part)) = self.parts.get_key_value(name) else {
                continue;
            };
            if !seen.insert(key) {
                continue;
            }
            order.push(key);
            for rel in &part.relationships {
                if let Some(target) = rel.target_part(key) {
                    if let Some((target_key, target_part)) = self.parts.get_key_value(&target) {
                        if !seen.contains(target_key) && !stop(target_key, target_part) {
                            queue.push_back(target_key);
                        }
                    }
                }
            }
        }
        order
    }
}
