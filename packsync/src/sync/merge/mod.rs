//! Reconciles server-declared settings with files the player may have
//! edited. Every merge is idempotent and leaves the file untouched when
//! nothing changes.

use std::io;
use std::path::{Path, PathBuf};

use packsync_core::KeyValueEntry;
use packsync_nbt::NbtError;
use thiserror::Error;

pub mod options;
pub mod properties;
pub mod servers;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed \\uXXXX escape on line {line}")]
    MalformedEscape { line: usize },
    #[error("invalid server list: {0}")]
    Nbt(#[from] NbtError),
}

impl MergeError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> MergeError + '_ {
        move |source| MergeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Applies remote entries to an ordered key/value list. Missing keys are
/// appended; existing keys only change when the entry is forced. Returns
/// whether anything changed.
pub fn apply_entries(pairs: &mut Vec<(String, String)>, entries: &[KeyValueEntry]) -> bool {
    let mut changed = false;
    for entry in entries {
        match pairs.iter_mut().find(|(key, _)| *key == entry.key) {
            Some((_, value)) => {
                if entry.force && *value != entry.value {
                    *value = entry.value.clone();
                    changed = true;
                }
            }
            None => {
                pairs.push((entry.key.clone(), entry.value.clone()));
                changed = true;
            }
        }
    }
    changed
}

/// Reads a text file, treating a missing file as `None`.
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>, MergeError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(MergeError::io(path)(err)),
    }
}

/// Replaces `path` through a temp sibling.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MergeError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(MergeError::io(path))?;
    }
    let mut temp = path.as_os_str().to_os_string();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    tokio::fs::write(&temp, bytes)
        .await
        .map_err(MergeError::io(path))?;
    tokio::fs::rename(&temp, path)
        .await
        .map_err(MergeError::io(path))
}

/// Upserts `key` while keeping its position.
pub(crate) fn set_pair(pairs: &mut Vec<(String, String)>, key: String, value: String) {
    match pairs.iter_mut().find(|(existing, _)| *existing == key) {
        Some((_, slot)) => *slot = value,
        None => pairs.push((key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn force_flag_contract() {
        let mut local = pairs(&[("a", "1"), ("b", "2")]);
        let changed = apply_entries(
            &mut local,
            &[
                KeyValueEntry::new("a", "9", false),
                KeyValueEntry::new("b", "8", true),
                KeyValueEntry::new("c", "3", false),
            ],
        );
        assert!(changed);
        assert_eq!(local, pairs(&[("a", "1"), ("b", "8"), ("c", "3")]));
    }

    #[test]
    fn unchanged_when_forced_value_matches() {
        let mut local = pairs(&[("a", "1")]);
        assert!(!apply_entries(&mut local, &[KeyValueEntry::new("a", "1", true)]));
        assert!(!apply_entries(&mut local, &[]));
    }
}
