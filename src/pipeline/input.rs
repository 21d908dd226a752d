//! Input and output path resolution.
//!
//! Both paths are made absolute before anything runs. Every path handed to
//! an external tool therefore starts with `/` (or a drive prefix), so none
//! can be mistaken for an option flag. The input must exist, be readable and
//! start with the PDF magic bytes; the output must not be the input.

use crate::error::SearchifyError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validated, absolute input and output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Resolve and validate both ends of a run.
pub fn resolve(input: &Path, output: &Path) -> Result<ResolvedPaths, SearchifyError> {
    let input = resolve_input(input)?;
    let output = resolve_output(&input, output)?;
    Ok(ResolvedPaths { input, output })
}

/// Resolve a local file path, validating existence and PDF magic bytes.
pub fn resolve_input(path: &Path) -> Result<PathBuf, SearchifyError> {
    if !path.exists() {
        return Err(SearchifyError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            let mut read = 0;
            while read < magic.len() {
                match f.read(&mut magic[read..]) {
                    Ok(0) => break,
                    Ok(n) => read += n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            if &magic != b"%PDF" {
                return Err(SearchifyError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(SearchifyError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(SearchifyError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    let resolved = path
        .canonicalize()
        .map_err(|_| SearchifyError::FileNotFound {
            path: path.to_path_buf(),
        })?;
    debug!("Resolved input PDF: {}", resolved.display());
    Ok(resolved)
}

/// Make `output` absolute and reject it when it names the input file.
///
/// The output need not exist yet; its parent directory is created later,
/// when the result is written.
pub fn resolve_output(input: &Path, output: &Path) -> Result<PathBuf, SearchifyError> {
    if output.as_os_str().is_empty() || output.file_name().is_none() {
        return Err(SearchifyError::InvalidConfig(format!(
            "output path '{}' does not name a file",
            output.display()
        )));
    }

    let absolute = if output.is_absolute() {
        output.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| SearchifyError::Internal(format!("cannot read current directory: {e}")))?
            .join(output)
    };

    // Compare canonical forms when the file (or at least its directory)
    // exists, so symlinks and `..` cannot sneak the input back in.
    let canonical = match absolute.canonicalize() {
        Ok(p) => p,
        Err(_) => match (absolute.parent(), absolute.file_name()) {
            (Some(parent), Some(name)) => parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| absolute.clone()),
            _ => absolute.clone(),
        },
    };

    if canonical == input {
        return Err(SearchifyError::SameInputOutput { path: canonical });
    }

    debug!("Resolved output PDF: {}", canonical.display());
    Ok(canonical)
}
