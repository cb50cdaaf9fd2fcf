mod constants;
mod container;
mod content_types;
mod discover;
mod identity;
mod import;
mod merge;
mod merge_config;
mod package;
mod pdf;
mod parse_rels;
mod part_name;
mod presentation;
mod slide;
mod theme;
mod xml_edit;

pub use constants::{content_type, rel_type};
pub use container::{GraphOptions, PartKind, PptxContainer, SourceGraph, SourcePart};
pub use content_types::ContentTypes;
pub use discover::{collect_inputs, is_lock_file, is_pdf, LOCK_FILE_PREFIX};
pub use identity::{IdentityMap, PartNamer};
pub use merge::{
    merge, CancelFlag, MergeReport, MergeResult, MergeState, Merger, Progress, SourceReport, SourceStatus,
};
pub use merge_config::{MergeConfig, MergeConfigBuilder};
pub use package::Package;
pub use parse_rels::Relationship;
pub use part_name::PartName;
pub use pdf::{fit_picture, Placement, RenderedPages};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unreadable package {path}: {reason}")]
    UnreadablePackage { path: PathBuf, reason: String },

    #[error("{path} is not a presentation (main part is {content_type})")]
    NotAPresentation { path: PathBuf, content_type: String },

    #[error("Unresolved reference {reference} in {part}")]
    UnresolvedReference { part: String, reference: String },

    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Destination directory does not exist: {0}")]
    InvalidDestination(PathBuf),

    #[error("No input files")]
    NoInputFiles,

    #[error("None of the input files could be merged")]
    NoUsableSource,

    #[error("Merge cancelled")]
    Cancelled,

    #[error("Malformed part {part}: {reason}")]
    Malformed { part: String, reason: String },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(&'static str),
}

/// Error taxonomy reported per source and for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    UnreadablePackage,
    NotAPresentation,
    UnresolvedReference,
    Write,
    InvalidDestination,
    NoInputFiles,
    NoUsableSource,
    Cancelled,
}

impl Error {
    /// Classifies the error. Structural and I/O problems hit while reading a
    /// source count as an unreadable package.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::NotAPresentation { .. } => FailureKind::NotAPresentation,
            Error::UnresolvedReference { .. } => FailureKind::UnresolvedReference,
            Error::Write { .. } => FailureKind::Write,
            Error::InvalidDestination(_) => FailureKind::InvalidDestination,
            Error::NoInputFiles => FailureKind::NoInputFiles,
            Error::NoUsableSource => FailureKind::NoUsableSource,
            Error::Cancelled => FailureKind::Cancelled,
            Error::UnreadablePackage { .. }
            | Error::Malformed { .. }
            | Error::Zip(_)
            | Error::Xml(_)
            | Error::Utf8(_)
            | Error::Image(_)
            | Error::Io(_)
            | Error::ParseError(_) => FailureKind::UnreadablePackage,
        }
    }

    /// Fatal errors end the whole run; all others only skip the current source.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::Write
                | FailureKind::InvalidDestination
                | FailureKind::NoInputFiles
                | FailureKind::NoUsableSource
                | FailureKind::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
