pub const P_NAMESPACE: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
pub const RELS_NAMESPACE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const PACKAGE_RELS_NAMESPACE: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const CONTENT_TYPES_NAMESPACE: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
pub const VML_OFFICE_NAMESPACE: &str = "urn:schemas-microsoft-com:office:office";

pub const CONTENT_TYPES_PART: &str = "/[Content_Types].xml";
pub const PACKAGE_RELS_PART: &str = "/_rels/.rels";

/// Relationship type URIs.
pub mod rel_type {
    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const SLIDE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
    pub const SLIDE_LAYOUT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
    pub const SLIDE_MASTER: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster";
    pub const NOTES_SLIDE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesSlide";
    pub const NOTES_MASTER: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesMaster";
    pub const HANDOUT_MASTER: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/handoutMaster";
    pub const THEME: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";
    pub const PRES_PROPS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/presProps";
    pub const VIEW_PROPS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/viewProps";
    pub const TABLE_STYLES: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/tableStyles";
    pub const IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
    pub const HYPERLINK: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
    pub const COMMENTS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
    pub const COMMENT_AUTHORS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/commentAuthors";
    pub const MODERN_COMMENTS: &str = "http://schemas.microsoft.com/office/2018/10/relationships/comments";
    pub const MODERN_COMMENT_AUTHORS: &str =
        "http://schemas.microsoft.com/office/2018/10/relationships/authors";
    pub const EXTENDED_PROPERTIES: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties";
    pub const THUMBNAIL: &str = "http://schemas.openxmlformats.org/package/2006/relationships/metadata/thumbnail";
    pub const DIGITAL_SIGNATURE_ORIGIN: &str =
        "http://schemas.openxmlformats.org/package/2006/relationships/digital-signature/origin";
}

/// Content types of the parts the merge engine needs to tell apart.
pub mod content_type {
    pub const PRESENTATION: &str =
        "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
    pub const PRESENTATION_MACRO: &str = "application/vnd.ms-powerpoint.presentation.macroEnabled.main+xml";
    pub const TEMPLATE: &str = "application/vnd.openxmlformats-officedocument.presentationml.template.main+xml";
    pub const TEMPLATE_MACRO: &str = "application/vnd.ms-powerpoint.template.macroEnabled.main+xml";
    pub const SLIDESHOW: &str = "application/vnd.openxmlformats-officedocument.presentationml.slideshow.main+xml";
    pub const SLIDESHOW_MACRO: &str = "application/vnd.ms-powerpoint.slideshow.macroEnabled.main+xml";

    pub const SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
    pub const SLIDE_LAYOUT: &str = "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml";
    pub const SLIDE_MASTER: &str = "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml";
    pub const NOTES_SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.notesSlide+xml";
    pub const NOTES_MASTER: &str = "application/vnd.openxmlformats-officedocument.presentationml.notesMaster+xml";
    pub const THEME: &str = "application/vnd.openxmlformats-officedocument.theme+xml";
    pub const PNG: &str = "image/png";
    pub const RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
    pub const XML: &str = "application/xml";

    pub const PRESENTATION_MAIN_TYPES: [&str; 6] = [
        PRESENTATION,
        PRESENTATION_MACRO,
        TEMPLATE,
        TEMPLATE_MACRO,
        SLIDESHOW,
        SLIDESHOW_MACRO,
    ];

    /// Whether parts of this content type are well-formed XML that can be checked for references.
    pub fn is_xml(content_type: &str) -> bool {
        content_type.ends_with("+xml") || content_type == XML || content_type == "text/xml"
    }
}
