//! Sandbox path resolution shared by the action registry and the context builder.

use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};

/// Resolves `candidate` under `base` and returns its canonical absolute form.
///
/// Relative candidates are joined onto `base`. Any `..` component is refused
/// even if the lexical result would land back inside `base`, every existing
/// segment between `base` and the result must not be a symbolic link, and the
/// result must stay a descendant of (or equal to) the canonical base. Segments
/// that do not exist yet are allowed so callers can resolve paths they intend
/// to create.
pub fn resolve(base: &Path, candidate: &Path) -> Result<PathBuf, SandboxViolation> {
    let root = fs::canonicalize(base).map_err(|source| SandboxViolation::BaseUnavailable {
        base: base.to_path_buf(),
        source,
    })?;

    if candidate
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(SandboxViolation::ParentTraversal {
            path: candidate.to_path_buf(),
        });
    }

    let relative = if candidate.is_absolute() {
        candidate
            .strip_prefix(&root)
            .or_else(|_| candidate.strip_prefix(base))
            .map(Path::to_path_buf)
            .map_err(|_| SandboxViolation::OutsideBase {
                path: candidate.to_path_buf(),
                base: root.clone(),
            })?
    } else {
        candidate.to_path_buf()
    };

    let mut resolved = root.clone();
    let mut probing = true;
    for component in relative.components() {
        match component {
            Component::Normal(segment) => resolved.push(segment),
            Component::CurDir => continue,
            _ => {
                return Err(SandboxViolation::OutsideBase {
                    path: candidate.to_path_buf(),
                    base: root,
                })
            }
        }

        if !probing {
            continue;
        }
        match fs::symlink_metadata(&resolved) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                return Err(SandboxViolation::SymlinkInPath { path: resolved });
            }
            Ok(_) => {}
            // Nothing below a missing segment can exist either.
            Err(err) if err.kind() == io::ErrorKind::NotFound => probing = false,
            Err(source) => {
                return Err(SandboxViolation::Inspect {
                    path: resolved,
                    source,
                })
            }
        }
    }

    Ok(resolved)
}

/// Refuses `path` when the entry itself is a symbolic link.
pub fn ensure_not_symlink(path: &Path) -> Result<(), SandboxViolation> {
    let metadata = fs::symlink_metadata(path).map_err(|source| SandboxViolation::Inspect {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.file_type().is_symlink() {
        return Err(SandboxViolation::SymlinkInPath {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxViolation {
    #[error("Sandbox base {base} is not accessible: {source}")]
    BaseUnavailable { base: PathBuf, source: io::Error },
    #[error("Path {path} contains parent directory traversal")]
    ParentTraversal { path: PathBuf },
    #[error("Path {path} escapes sandbox base {base}")]
    OutsideBase { path: PathBuf, base: PathBuf },
    #[error("Path {path} is or traverses a symbolic link")]
    SymlinkInPath { path: PathBuf },
    #[error("Cannot inspect {path}: {source}")]
    Inspect { path: PathBuf, source: io::Error },
}
