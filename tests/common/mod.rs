#![allow(dead_code)]

use pptx_combine::{rel_type, PartName, PptxContainer};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;

const P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const MODERN_COMMENTS: &str = "http://schemas.microsoft.com/office/2018/10/relationships/comments";

/// A small but structurally complete presentation written with the zip writer.
///
/// Every deck uses the same part names (`slide1.xml`, `theme1.xml`, ...), so
/// merging two decks always collides.
#[derive(Debug, Clone)]
pub struct Deck {
    pub theme: String,
    pub slides: usize,
    pub image: bool,
    pub notes: bool,
    pub slide_width: u32,
    /// Makes the last slide reference a relationship id its part does not have.
    pub dangling_reference: bool,
    /// Gives slide 1 a modern comment, referenced from a `p:ext` of the slide.
    pub modern_comment: bool,
    /// Adds view properties whose outline view lists slide 1.
    pub outline_view: bool,
    /// Makes slide 1 jump to slide 2 through a hyperlink.
    pub link_to_next: bool,
    /// Adds `docProps/app.xml` with the deck's slide count.
    pub app_properties: bool,
    pub image_name: String,
}

impl Deck {
    pub fn new(theme: &str, slides: usize) -> Self {
        Self {
            theme: theme.to_string(),
            slides,
            image: true,
            notes: false,
            slide_width: 9144000,
            dangling_reference: false,
            modern_comment: false,
            outline_view: false,
            link_to_next: false,
            app_properties: false,
            image_name: "image1.png".to_string(),
        }
    }

    pub fn with_notes(mut self) -> Self {
        self.notes = true;
        self
    }

    pub fn with_slide_width(mut self, width: u32) -> Self {
        self.slide_width = width;
        self
    }

    pub fn with_dangling_reference(mut self) -> Self {
        self.dangling_reference = true;
        self
    }

    pub fn with_modern_comment(mut self) -> Self {
        self.modern_comment = true;
        self
    }

    pub fn with_outline_view(mut self) -> Self {
        self.outline_view = true;
        self
    }

    pub fn with_link_to_next(mut self) -> Self {
        self.link_to_next = true;
        self
    }

    pub fn with_app_properties(mut self) -> Self {
        self.app_properties = true;
        self
    }

    pub fn with_image_name(mut self, name: &str) -> Self {
        self.image_name = name.to_string();
        self
    }

    pub fn write(&self, path: &Path) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        let mut add = |name: &str, data: &[u8]| {
            zip.start_file(name, options).unwrap();
            zip.write_all(data).unwrap();
        };

        add("[Content_Types].xml", self.content_types().as_bytes());
        let mut package_rels = vec![
            ("rId1", "officeDocument", "ppt/presentation.xml"),
            ("rId2", "core", "docProps/core.xml"),
        ];
        if self.app_properties {
            package_rels.push(("rId3", "extended-properties", "docProps/app.xml"));
            add(
                "docProps/app.xml",
                format!(
                    r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Slides>{}</Slides></Properties>"#,
                    self.slides
                )
                .as_bytes(),
            );
        }
        add("_rels/.rels", rels(&package_rels).as_bytes());
        add(
            "docProps/core.xml",
            br#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties"/>"#,
        );
        add("ppt/presentation.xml", self.presentation().as_bytes());
        add("ppt/_rels/presentation.xml.rels", self.presentation_rels().as_bytes());
        add(
            "ppt/presProps.xml",
            format!(r#"<p:presentationPr xmlns:p="{P}"/>"#).as_bytes(),
        );
        add("ppt/theme/theme1.xml", theme(&self.theme).as_bytes());
        add(
            "ppt/slideMasters/slideMaster1.xml",
            format!(
                r#"<p:sldMaster xmlns:a="{A}" xmlns:r="{R}" xmlns:p="{P}"><p:cSld><p:spTree/></p:cSld><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#
            )
            .as_bytes(),
        );
        add(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            rels(&[
                ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml"),
                ("rId2", "theme", "../theme/theme1.xml"),
            ])
            .as_bytes(),
        );
        add(
            "ppt/slideLayouts/slideLayout1.xml",
            format!(r#"<p:sldLayout xmlns:a="{A}" xmlns:r="{R}" xmlns:p="{P}"><p:cSld name="Title"/></p:sldLayout>"#).as_bytes(),
        );
        add(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            rels(&[("rId1", "slideMaster", "../slideMasters/slideMaster1.xml")]).as_bytes(),
        );
        if self.image {
            add(&format!("ppt/media/{}", self.image_name), b"\x89PNG\r\n\x1a\nfixture");
        }
        if self.outline_view {
            add(
                "ppt/viewProps.xml",
                format!(
                    r#"<p:viewPr xmlns:a="{A}" xmlns:r="{R}" xmlns:p="{P}"><p:outlineViewPr><p:cViewPr><p:scale><a:sx n="33" d="100"/><a:sy n="33" d="100"/></p:scale><p:origin x="0" y="0"/></p:cViewPr><p:sldLst><p:sld r:id="rId1" collapse="1"/></p:sldLst></p:outlineViewPr></p:viewPr>"#
                )
                .as_bytes(),
            );
            add(
                "ppt/_rels/viewProps.xml.rels",
                rels(&[("rId1", "slide", "slides/slide1.xml")]).as_bytes(),
            );
        }
        if self.modern_comment {
            add(
                "ppt/comments/modernComment_100_1.xml",
                br#"<p188:cmLst xmlns:p188="http://schemas.microsoft.com/office/powerpoint/2018/8/main"/>"#,
            );
        }
        if self.notes {
            add(
                "ppt/notesMasters/notesMaster1.xml",
                format!(r#"<p:notesMaster xmlns:a="{A}" xmlns:r="{R}" xmlns:p="{P}"><p:cSld><p:spTree/></p:cSld></p:notesMaster>"#)
                    .as_bytes(),
            );
            add(
                "ppt/notesMasters/_rels/notesMaster1.xml.rels",
                rels(&[("rId1", "theme", "../theme/theme2.xml")]).as_bytes(),
            );
            add("ppt/theme/theme2.xml", theme(&format!("{} Notes", self.theme)).as_bytes());
        }

        for n in 1..=self.slides {
            add(&format!("ppt/slides/slide{n}.xml"), self.slide(n).as_bytes());
            let mut slide_rels = vec![("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml".to_string())];
            if self.image {
                slide_rels.push(("rId2", "image", format!("../media/{}", self.image_name)));
            }
            if self.notes {
                slide_rels.push(("rId3", "notesSlide", format!("../notesSlides/notesSlide{n}.xml")));
            }
            if self.modern_comment && n == 1 {
                slide_rels.push((
                    "rId4",
                    MODERN_COMMENTS,
                    "../comments/modernComment_100_1.xml".to_string(),
                ));
            }
            if self.link_to_next && n == 1 {
                slide_rels.push(("rId5", "slide", "slide2.xml".to_string()));
            }
            let slide_rels: Vec<(&str, &str, &str)> =
                slide_rels.iter().map(|(id, ty, target)| (*id, *ty, target.as_str())).collect();
            add(&format!("ppt/slides/_rels/slide{n}.xml.rels"), rels(&slide_rels).as_bytes());

            if self.notes {
                add(
                    &format!("ppt/notesSlides/notesSlide{n}.xml"),
                    format!(
                        r#"<p:notes xmlns:a="{A}" xmlns:r="{R}" xmlns:p="{P}"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>notes {}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:notes>"#,
                        marker(&self.theme, n)
                    )
                    .as_bytes(),
                );
                let slide_target = format!("../slides/slide{n}.xml");
                add(
                    &format!("ppt/notesSlides/_rels/notesSlide{n}.xml.rels"),
                    rels(&[
                        ("rId1", "notesMaster", "../notesMasters/notesMaster1.xml"),
                        ("rId2", "slide", slide_target.as_str()),
                    ])
                    .as_bytes(),
                );
            }
        }

        zip.finish().unwrap();
    }

    fn content_types(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/>"#,
        );
        let mut add = |part: &str, ct: &str| {
            xml.push_str(&format!(r#"<Override PartName="{part}" ContentType="{ct}"/>"#));
        };
        add(
            "/ppt/presentation.xml",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml",
        );
        add("/docProps/core.xml", "application/vnd.openxmlformats-package.core-properties+xml");
        add(
            "/ppt/presProps.xml",
            "application/vnd.openxmlformats-officedocument.presentationml.presProps+xml",
        );
        add("/ppt/theme/theme1.xml", "application/vnd.openxmlformats-officedocument.theme+xml");
        add(
            "/ppt/slideMasters/slideMaster1.xml",
            "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml",
        );
        add(
            "/ppt/slideLayouts/slideLayout1.xml",
            "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml",
        );
        if self.app_properties {
            add(
                "/docProps/app.xml",
                "application/vnd.openxmlformats-officedocument.extended-properties+xml",
            );
        }
        if self.outline_view {
            add(
                "/ppt/viewProps.xml",
                "application/vnd.openxmlformats-officedocument.presentationml.viewProps+xml",
            );
        }
        if self.modern_comment {
            add("/ppt/comments/modernComment_100_1.xml", "application/vnd.ms-powerpoint.comments+xml");
        }
        if self.notes {
            add(
                "/ppt/notesMasters/notesMaster1.xml",
                "application/vnd.openxmlformats-officedocument.presentationml.notesMaster+xml",
            );
            add("/ppt/theme/theme2.xml", "application/vnd.openxmlformats-officedocument.theme+xml");
        }
        for n in 1..=self.slides {
            add(
                &format!("/ppt/slides/slide{n}.xml"),
                "application/vnd.openxmlformats-officedocument.presentationml.slide+xml",
            );
            if self.notes {
                add(
                    &format!("/ppt/notesSlides/notesSlide{n}.xml"),
                    "application/vnd.openxmlformats-officedocument.presentationml.notesSlide+xml",
                );
            }
        }
        xml.push_str("</Types>");
        xml
    }

    fn presentation(&self) -> String {
        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:presentation xmlns:a="{A}" xmlns:r="{R}" xmlns:p="{P}"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#
        );
        if self.notes {
            xml.push_str(r#"<p:notesMasterIdLst><p:notesMasterId r:id="rId4"/></p:notesMasterIdLst>"#);
        }
        xml.push_str("<p:sldIdLst>");
        for n in 1..=self.slides {
            xml.push_str(&format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 255 + n, 10 + n));
        }
        xml.push_str("</p:sldIdLst>");
        xml.push_str(&format!(
            r#"<p:sldSz cx="{}" cy="6858000"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#,
            self.slide_width
        ));
        xml
    }

    fn presentation_rels(&self) -> String {
        let mut entries = vec![
            ("rId1".to_string(), "slideMaster", "slideMasters/slideMaster1.xml".to_string()),
            ("rId2".to_string(), "theme", "theme/theme1.xml".to_string()),
            ("rId3".to_string(), "presProps", "presProps.xml".to_string()),
        ];
        if self.notes {
            entries.push(("rId4".to_string(), "notesMaster", "notesMasters/notesMaster1.xml".to_string()));
        }
        if self.outline_view {
            entries.push(("rId5".to_string(), "viewProps", "viewProps.xml".to_string()));
        }
        for n in 1..=self.slides {
            entries.push((format!("rId{}", 10 + n), "slide", format!("slides/slide{n}.xml")));
        }
        let entries: Vec<(&str, &str, &str)> = entries
            .iter()
            .map(|(id, ty, target)| (id.as_str(), *ty, target.as_str()))
            .collect();
        rels(&entries)
    }

    fn slide(&self, n: usize) -> String {
        let picture = if self.dangling_reference && n == self.slides {
            r#"<p:pic><p:blipFill><a:blip r:embed="rId9"/></p:blipFill></p:pic>"#
        } else if self.image {
            r#"<p:pic><p:blipFill><a:blip r:embed="rId2"/></p:blipFill></p:pic>"#
        } else {
            ""
        };
        let link = if self.link_to_next && n == 1 {
            r#"<p:nvSpPr><p:cNvPr id="2" name="Next"><a:hlinkClick r:id="rId5" action="ppaction://hlinksldjump"/></p:cNvPr><p:cNvSpPr/><p:nvPr/></p:nvSpPr>"#
        } else {
            ""
        };
        let comments = if self.modern_comment && n == 1 {
            r#"<p:extLst><p:ext uri="{6950BFC3-D8DA-4A85-94F7-54DA5524770B}"><p188:commentRel xmlns:p188="http://schemas.microsoft.com/office/powerpoint/2018/8/main" r:id="rId4"/></p:ext></p:extLst>"#
        } else {
            ""
        };
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld xmlns:a="{A}" xmlns:r="{R}" xmlns:p="{P}"><p:cSld><p:spTree><p:sp>{link}<p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>{picture}</p:spTree></p:cSld>{comments}</p:sld>"#,
            marker(&self.theme, n)
        )
    }
}

/// Text placed on slide `n` of the deck with the given theme.
pub fn marker(theme: &str, n: usize) -> String {
    format!("{theme}-{n}")
}

fn theme(name: &str) -> String {
    format!(r#"<a:theme xmlns:a="{A}" name="{name}"><a:themeElements/></a:theme>"#)
}

fn rels(entries: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (id, kind, target) in entries {
        let rel_type = if *kind == "core" {
            "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties".to_string()
        } else if kind.starts_with("http") {
            kind.to_string()
        } else {
            format!("{REL}/{kind}")
        };
        xml.push_str(&format!(r#"<Relationship Id="{id}" Type="{rel_type}" Target="{target}"/>"#));
    }
    xml.push_str("</Relationships>");
    xml
}

/// Writes a package whose main document is a word processing document.
pub fn write_document(path: &Path) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(br#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#).unwrap();
    zip.start_file("_rels/.rels", options).unwrap();
    zip.write_all(rels(&[("rId1", "officeDocument", "word/document.xml")]).as_bytes())
        .unwrap();
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(br#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"/>"#)
        .unwrap();
    zip.finish().unwrap();
}

pub fn read_text(container: &mut PptxContainer, part: &PartName) -> String {
    String::from_utf8(container.read_part(part).unwrap()).unwrap()
}

/// Target of the first relationship of `rel_type` owned by `part`.
pub fn related(container: &mut PptxContainer, part: &PartName, rel_type: &str) -> Option<PartName> {
    container
        .relationships(part)
        .unwrap()
        .into_iter()
        .find(|r| r.rel_type == rel_type)
        .and_then(|r| r.target_part(part))
}

/// Text of the `<a:t>` runs of a slide.
pub fn slide_text(container: &mut PptxContainer, slide: &PartName) -> String {
    let xml = read_text(container, slide);
    let doc = roxmltree::Document::parse(&xml).unwrap();
    doc.descendants()
        .filter(|n| n.has_tag_name((A, "t")))
        .filter_map(|n| n.text())
        .collect()
}

/// The master and theme a slide renders with.
pub fn chain_of(container: &mut PptxContainer, slide: &PartName) -> (PartName, PartName) {
    let layout = related(container, slide, rel_type::SLIDE_LAYOUT).unwrap();
    let master = related(container, &layout, rel_type::SLIDE_MASTER).unwrap();
    let theme = related(container, &master, rel_type::THEME).unwrap();
    (master, theme)
}

pub fn theme_name(container: &mut PptxContainer, theme: &PartName) -> String {
    let xml = read_text(container, theme);
    let doc = roxmltree::Document::parse(&xml).unwrap();
    doc.root_element().attribute("name").unwrap_or_default().to_string()
}

/// Names of all zip members of a package.
pub fn members(path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    archive.file_names().map(str::to_string).collect()
}

pub fn read_member(path: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut content = String::new();
    archive.by_name(name).unwrap().read_to_string(&mut content).unwrap();
    content
}
