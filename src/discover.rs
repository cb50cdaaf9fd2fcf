use crate::Result;
use std::path::{Path, PathBuf};

/// Office writes lock files named `~$<document>` next to open documents.
pub const LOCK_FILE_PREFIX: &str = "~$";

pub fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(LOCK_FILE_PREFIX))
        .unwrap_or(false)
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}

/// Whether the input is merged page by page as pictures rather than opened as a package.
pub fn is_pdf(path: &Path) -> bool {
    has_extension(path, "pdf")
}

/// Lists the presentations and PDF documents in `dir` in merge order.
///
/// Only regular files with a `.pptx` or `.pdf` extension are returned, sorted
/// by file name; Office lock files are skipped. Subdirectories are not searched.
///
/// # Errors
///
/// [`crate::Error::Io`] if the directory cannot be read.
pub fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && (has_extension(&path, "pptx") || is_pdf(&path)) && !is_lock_file(&path) {
            inputs.push(path);
        }
    }
    inputs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(inputs)
}
