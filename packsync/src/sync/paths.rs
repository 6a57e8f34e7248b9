use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path `{0}` is absolute")]
    Absolute(String),
    #[error("path `{0}` escapes the game directory")]
    Escapes(String),
}

/// Maps a server-supplied relative path under `root`. `..` is resolved
/// lexically and may not climb above `root`.
pub fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf, PathError> {
    if relative.trim().is_empty() {
        return Err(PathError::Empty);
    }

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => continue,
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(PathError::Escapes(relative.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::Absolute(relative.to_string()));
            }
        }
    }
    if parts.is_empty() {
        return Err(PathError::Empty);
    }

    let mut out = root.to_path_buf();
    out.extend(parts);
    Ok(out)
}
