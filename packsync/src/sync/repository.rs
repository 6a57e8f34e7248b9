//! Content-addressed blob store.
//!
//! Blobs live at `<root>/<first two checksum chars>/<checksum><ext>` with a
//! `<checksum>.meta.json` sidecar holding the [`FileInfo`] they were stored
//! under. Two roots are scanned: the shared one and the per-installation
//! one. The in-memory index is rebuilt from disk on every run.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use packsync_core::{FileInfo, RemoteFile};
use thiserror::Error;
use tokio::task::JoinSet;

use super::checksum;
use crate::config::ConfigError;
use crate::issues::IssueLog;
use crate::state::write_json_atomic;

const SIDECAR_SUFFIX: &str = ".meta.json";
const PARTIAL_SUFFIX: &str = ".partial";
const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("checksum `{0}` cannot address a blob")]
    InvalidChecksum(String),
    #[error("sidecar {path} describes `{found}`, not `{expected}`")]
    SidecarMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("failed to write metadata: {0}")]
    Metadata(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEntry {
    pub path: PathBuf,
    pub info: FileInfo,
}

pub struct Repository {
    primary: PathBuf,
    local: PathBuf,
    entries: DashMap<String, RepositoryEntry>,
    primary_unavailable: AtomicBool,
}

impl Repository {
    pub fn new(primary: impl Into<PathBuf>, local: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            local: local.into(),
            entries: DashMap::new(),
            primary_unavailable: AtomicBool::new(false),
        }
    }

    /// Creates both roots. When the shared root cannot be created, every
    /// non-local store of this run goes to the local root instead.
    pub async fn prepare(&self, issues: &IssueLog) -> Result<(), RepositoryError> {
        if self.primary != self.local
            && let Err(err) = tokio::fs::create_dir_all(&self.primary).await
        {
            self.primary_unavailable.store(true, Ordering::SeqCst);
            issues.warn_at(
                "Shared repository is unavailable, using the local repository",
                &self.primary,
                err,
            );
        }
        tokio::fs::create_dir_all(&self.local)
            .await
            .map_err(|source| RepositoryError::Io {
                path: self.local.clone(),
                source,
            })
    }

    /// Scans both roots and indexes every blob with a matching sidecar.
    /// Returns the number of indexed blobs.
    pub async fn discover(self: &Arc<Self>, issues: &IssueLog) -> usize {
        let mut blobs = Vec::new();
        for root in self.roots() {
            if let Err(err) = collect_blobs(root, &mut blobs).await {
                issues.warn_at("Failed to scan repository", root, err);
            }
        }

        let mut tasks = JoinSet::new();
        for blob in blobs {
            let repository = Arc::clone(self);
            let issues = issues.clone();
            tasks.spawn(async move {
                match read_sidecar(&blob).await {
                    Ok(info) => {
                        repository.entries.insert(
                            info.checksum.clone(),
                            RepositoryEntry { path: blob, info },
                        );
                    }
                    Err(err) => issues.warn_at("Skipping repository file", &blob, err),
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                issues.warn(format!("repository scan task failed: {err}"));
            }
        }

        let count = self.entries.len();
        tracing::debug!(count, "repository discovered");
        count
    }

    pub fn lookup(&self, checksum: &str) -> Option<RepositoryEntry> {
        self.entries.get(checksum).map(|entry| entry.value().clone())
    }

    /// Drops an untrustworthy blob from the index so the next fetch
    /// downloads it again. The file itself is left alone.
    pub fn evict(&self, checksum: &str) -> Option<RepositoryEntry> {
        self.entries.remove(checksum).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Where a descriptor's blob belongs.
    pub fn blob_path(&self, file: &RemoteFile) -> Result<PathBuf, RepositoryError> {
        let checksum = &file.info.checksum;
        if checksum.len() < 2 || !checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(RepositoryError::InvalidChecksum(checksum.clone()));
        }
        let root = if file.local || self.primary_unavailable.load(Ordering::SeqCst) {
            &self.local
        } else {
            &self.primary
        };
        Ok(root
            .join(&checksum[..2])
            .join(format!("{checksum}{}", file.info.extension())))
    }

    /// Writes the sidecar next to `path` and indexes the blob. When the
    /// sidecar cannot be written the blob stays on disk but is not indexed.
    pub async fn store(
        &self,
        path: PathBuf,
        info: FileInfo,
    ) -> Result<RepositoryEntry, RepositoryError> {
        write_json_atomic(&sidecar_path(&path, &info.checksum), &info).await?;
        let entry = RepositoryEntry { path, info };
        self.entries
            .insert(entry.info.checksum.clone(), entry.clone());
        Ok(entry)
    }

    /// Whether the blob on disk still has the recorded size and checksum.
    pub async fn verify(&self, entry: &RepositoryEntry) -> io::Result<bool> {
        checksum::file_matches(&entry.path, &entry.info.checksum, entry.info.size).await
    }

    fn roots(&self) -> Vec<&Path> {
        if self.primary == self.local {
            vec![self.local.as_path()]
        } else {
            vec![self.primary.as_path(), self.local.as_path()]
        }
    }
}

async fn collect_blobs(root: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut prefixes = match tokio::fs::read_dir(root).await {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    while let Some(prefix) = prefixes.next_entry().await? {
        if !prefix.file_type().await?.is_dir() {
            continue;
        }
        let mut files = tokio::fs::read_dir(prefix.path()).await?;
        while let Some(file) = files.next_entry().await? {
            let name = file.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(SIDECAR_SUFFIX)
                || name.ends_with(PARTIAL_SUFFIX)
                || name.ends_with(TEMP_SUFFIX)
            {
                continue;
            }
            if file.file_type().await?.is_file() {
                out.push(file.path());
            }
        }
    }
    Ok(())
}

fn blob_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(index) => name[..index].to_string(),
        None => name,
    }
}

fn sidecar_path(blob: &Path, checksum: &str) -> PathBuf {
    blob.with_file_name(format!("{checksum}{SIDECAR_SUFFIX}"))
}

async fn read_sidecar(blob: &Path) -> Result<FileInfo, RepositoryError> {
    let stem = blob_stem(blob);
    let path = sidecar_path(blob, &stem);
    let raw = tokio::fs::read(&path)
        .await
        .map_err(|source| RepositoryError::Io {
            path: path.clone(),
            source,
        })?;
    let info: FileInfo = serde_json::from_slice(&raw).map_err(|source| {
        RepositoryError::Metadata(ConfigError::Json {
            path: path.clone(),
            source,
        })
    })?;
    if !info.checksum.eq_ignore_ascii_case(&stem) {
        return Err(RepositoryError::SidecarMismatch {
            path,
            expected: stem,
            found: info.checksum,
        });
    }
    Ok(info)
}
