//! Input resolution: validate a local PDF path and scan directories.
//!
//! The `%PDF` magic check happens before pdfium sees the file so a stray
//! `.pdf`-named TIFF or HTML error page yields a clear [`TriageError::NotAPdf`]
//! rather than a pdfium parse failure.

use crate::error::TriageError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` exists, is readable, and starts with `%PDF`.
pub fn resolve_input(path: &Path) -> Result<PathBuf, TriageError> {
    let path = path.to_path_buf();

    if !path.exists() {
        return Err(TriageError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(TriageError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(TriageError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(TriageError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// True for a `.pdf` extension in any case.
pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// All PDF files directly inside `dir`, sorted by file name.
pub fn collect_pdfs(dir: &Path) -> Result<Vec<PathBuf>, TriageError> {
    if !dir.is_dir() {
        return Err(TriageError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|source| TriageError::ReadFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut pdfs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| TriageError::ReadFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && has_pdf_extension(&path) {
            pdfs.push(path);
        }
    }
    pdfs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    debug!("Found {} PDF(s) in {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

/// The bare file name used as the ground-truth key.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
