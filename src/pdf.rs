//! PDF inputs: every page is rendered to a PNG by poppler's `pdftoppm` and
//! placed on a slide of its own.

use crate::constants::{content_type, rel_type, RELS_NAMESPACE};
use crate::identity::PartNamer;
use crate::package::Package;
use crate::parse_rels::{next_rel_id, Relationship};
use crate::xml_edit::{is_p_element, parse_document, XML_DECLARATION};
use crate::{Error, PartName, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::debug;

/// Position of the blank layout in the default Office layout set, used when no
/// layout declares `type="blank"`.
const BLANK_LAYOUT_INDEX: usize = 6;

/// Page images of one PDF, living in a temporary directory that is removed on drop.
#[derive(Debug)]
pub struct RenderedPages {
    _dir: TempDir,
    pages: Vec<PathBuf>,
}

impl RenderedPages {
    /// Runs `renderer` (a `pdftoppm` compatible program) on `pdf`.
    ///
    /// # Errors
    ///
    /// [`Error::UnreadablePackage`] if the renderer is not installed, fails, or
    /// produces no pages.
    pub fn render(pdf: &Path, renderer: &Path, resolution: u32) -> Result<Self> {
        let unreadable = |reason: String| Error::UnreadablePackage {
            path: pdf.to_path_buf(),
            reason,
        };

        let dir = tempfile::Builder::new().prefix("combine-pdf-").tempdir()?;
        let output = Command::new(renderer)
            .arg("-png")
            .arg("-r")
            .arg(resolution.to_string())
            .arg(pdf)
            .arg(dir.path().join("page"))
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => unreadable(format!(
                    "{} not found; install poppler to merge PDF files",
                    renderer.display()
                )),
                _ => unreadable(format!("cannot run {}: {}", renderer.display(), e)),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(unreadable(format!(
                "{} failed ({}): {}",
                renderer.display(),
                output.status,
                stderr.trim()
            )));
        }

        let mut pages: Vec<(u32, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(dir.path())? {
            let path = entry?.path();
            if let Some(number) = page_number(&path) {
                pages.push((number, path));
            }
        }
        if pages.is_empty() {
            return Err(unreadable("no pages rendered".to_string()));
        }
        pages.sort();
        debug!(pdf = %pdf.display(), pages = pages.len(), "rendered pdf");

        Ok(Self {
            _dir: dir,
            pages: pages.into_iter().map(|(_, path)| path).collect(),
        })
    }

    pub fn pages(&self) -> &[PathBuf] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// `page-7.png` and `page-07.png` are both page 7.
fn page_number(path: &Path) -> Option<u32> {
    if path.extension()?.to_str()? != "png" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit_once('-')?.1.parse().ok()
}

/// Picture frame on a slide, in EMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u64,
    pub y: u64,
    pub cx: u64,
    pub cy: u64,
}

/// Scales an image of `image` pixels to fill the slide along its tighter
/// dimension and centres it along the other.
pub fn fit_picture(image: (u32, u32), slide: (u64, u64)) -> Placement {
    let (iw, ih) = (u128::from(image.0.max(1)), u128::from(image.1.max(1)));
    let (sw, sh) = (u128::from(slide.0), u128::from(slide.1));

    if iw * sh > ih * sw {
        let cy = (sw * ih / iw) as u64;
        Placement {
            x: 0,
            y: slide.1.saturating_sub(cy) / 2,
            cx: slide.0,
            cy,
        }
    } else {
        let cx = (sh * iw / ih) as u64;
        Placement {
            x: slide.0.saturating_sub(cx) / 2,
            y: 0,
            cx,
            cy: slide.1,
        }
    }
}

/// Adds one rendered page as a picture slide at the end of the target.
pub(crate) fn import_page(target: &mut Package, namer: &mut PartNamer, page: &Path, number: usize) -> Result<PartName> {
    let (width, height) = image::image_dimensions(page)?;
    let data = std::fs::read(page)?;
    let layout = picture_layout(target)?;
    let placement = fit_picture((width, height), target.slide_size());

    let image = namer.assign(&PartName::new("/ppt/media/image1.png"), |c| target.contains(c));
    let slide = namer.assign(&PartName::new("/ppt/slides/slide1.xml"), |c| target.contains(c));

    target.ensure_default("png", content_type::PNG);
    target.add_part(image.clone(), content_type::PNG.to_string(), data, Vec::new())?;
    let rels = vec![
        Relationship {
            id: "rId1".to_string(),
            rel_type: rel_type::SLIDE_LAYOUT.to_string(),
            target: layout.relative_to(&slide),
            external: false,
        },
        Relationship {
            id: "rId2".to_string(),
            rel_type: rel_type::IMAGE.to_string(),
            target: image.relative_to(&slide),
            external: false,
        },
    ];
    target.add_part(
        slide.clone(),
        content_type::SLIDE.to_string(),
        picture_slide(number, &placement).into_bytes(),
        rels,
    )?;

    let rel_id = next_rel_id(target.presentation_relationships(), std::iter::empty::<&String>());
    target.register_slide(&slide, &rel_id);
    debug!(page = number, slide = %slide, layout = %layout, "imported pdf page");
    Ok(slide)
}

/// The layout picture slides use: a blank layout of the first slide master,
/// else its seventh layout, else its last.
fn picture_layout(target: &Package) -> Result<PartName> {
    let no_layout = || Error::Malformed {
        part: target.presentation_part().to_string(),
        reason: "no slide layout to place PDF pages on".to_string(),
    };
    let master = target.master_parts().next().ok_or_else(no_layout)?;
    let xml = std::str::from_utf8(target.part_data(master).ok_or_else(no_layout)?)?;
    let doc = parse_document(xml)?;
    let rels = target.part_relationships(master);

    let layouts: Vec<PartName> = doc
        .descendants()
        .filter(|n| is_p_element(n, "sldLayoutId"))
        .filter_map(|n| n.attribute((RELS_NAMESPACE, "id")))
        .filter_map(|id| rels.iter().find(|r| r.id == id))
        .filter_map(|r| r.target_part(master))
        .filter(|layout| target.part_data(layout).is_some())
        .collect();

    for layout in &layouts {
        if is_blank_layout(target, layout)? {
            return Ok(layout.clone());
        }
    }
    let index = if layouts.len() > BLANK_LAYOUT_INDEX {
        BLANK_LAYOUT_INDEX
    } else {
        layouts.len().checked_sub(1).ok_or_else(no_layout)?
    };
    Ok(layouts[index].clone())
}

fn is_blank_layout(target: &Package, layout: &PartName) -> Result<bool> {
    let Some(data) = target.part_data(layout) else {
        return Ok(false);
    };
    let doc = parse_document(std::str::from_utf8(data)?)?;
    Ok(doc.root_element().attribute("type") == Some("blank"))
}

fn picture_slide(number: usize, at: &Placement) -> String {
    format!(
        concat!(
            "{decl}<p:sld xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" ",
            "xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" ",
            "xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\">",
            "<p:cSld><p:spTree>",
            "<p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>",
            "<p:grpSpPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"0\" cy=\"0\"/>",
            "<a:chOff x=\"0\" y=\"0\"/><a:chExt cx=\"0\" cy=\"0\"/></a:xfrm></p:grpSpPr>",
            "<p:pic><p:nvPicPr><p:cNvPr id=\"2\" name=\"Page {number}\"/>",
            "<p:cNvPicPr><a:picLocks noChangeAspect=\"1\"/></p:cNvPicPr><p:nvPr/></p:nvPicPr>",
            "<p:blipFill><a:blip r:embed=\"rId2\"/><a:stretch><a:fillRect/></a:stretch></p:blipFill>",
            "<p:spPr><a:xfrm><a:off x=\"{x}\" y=\"{y}\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm>",
            "<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></p:spPr></p:pic>",
            "</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"
        ),
        decl = XML_DECLARATION,
        number = number,
        x = at.x,
        y = at.y,
        cx = at.cx,
        cy = at.cy,
    )
}
