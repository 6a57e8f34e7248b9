//! Realises a manifest on disk in barrier-separated phases.
//!
//! Every unit of work is its own task. Task failures are turned into
//! issues and never abort sibling tasks. Failures of the mods and extras
//! phases are also counted; the caller checks [`Fetcher::failures`] between
//! phases. Merge failures are warnings only.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use packsync_core::{KeyValueEntry, RemoteFile, ServerEntry};
use packsync_nbt::Compound;
use tokio::task::JoinSet;

use super::checksum;
use super::merge::{self, MergeError};
use super::paths::resolve_under;
use super::planner::ModFetch;
use super::repository::{Repository, RepositoryError};
use super::transfer::{Expected, TransferClient, TransferError};
use crate::issues::IssueLog;

pub const SERVER_ICON_FILE: &str = "server-icon.png";
pub const SERVERS_FILE: &str = "servers.dat";
pub const OPTIONS_FILE: &str = "options.txt";
pub const PROPERTIES_FILE: &str = "server.properties";

#[derive(Debug, thiserror::Error)]
enum TaskError {
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("invalid server list document: {0}")]
    Document(#[from] packsync_nbt::NbtError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Auxiliary settings the server asked to merge.
#[derive(Debug, Clone, Default)]
pub struct AuxiliaryMerges {
    pub options: Option<Vec<KeyValueEntry>>,
    pub server_properties: Option<Vec<KeyValueEntry>>,
    pub server_list: Option<Vec<ServerEntry>>,
    pub servers_document: Option<RemoteFile>,
}

#[derive(Clone)]
pub struct Fetcher {
    game_dir: PathBuf,
    repository: Arc<Repository>,
    transfer: TransferClient,
    issues: IssueLog,
    failures: Arc<AtomicUsize>,
}

impl Fetcher {
    pub fn new(
        game_dir: impl Into<PathBuf>,
        repository: Arc<Repository>,
        transfer: TransferClient,
        issues: IssueLog,
    ) -> Self {
        Self {
            game_dir: game_dir.into(),
            repository,
            transfer,
            issues,
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    fn fail(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    /// Phase 1: downloads missing blobs and restamps changed metadata.
    pub async fn fetch_mods(&self, fetches: Vec<ModFetch>) {
        if fetches.is_empty() {
            return;
        }
        tracing::info!(count = fetches.len(), "fetching mods");
        let mut tasks = JoinSet::new();
        for fetch in fetches {
            let this = self.clone();
            tasks.spawn(async move {
                let file = fetch.file().clone();
                if let Err(err) = this.fetch_mod(fetch).await {
                    this.issues.error_with(
                        format!("Failed to update {} ({})", file.info.filename, file.info.checksum),
                        err,
                    );
                    this.fail();
                }
            });
        }
        self.drain(tasks).await;
    }

    async fn fetch_mod(&self, fetch: ModFetch) -> Result<(), TaskError> {
        match fetch {
            ModFetch::Download(file) => {
                let path = self.repository.blob_path(&file)?;
                tracing::info!(
                    file = %file.info.filename,
                    size = file.info.size,
                    url = %file.url,
                    "downloading"
                );
                self.transfer
                    .download_to_path(
                        &file.url,
                        &path,
                        file.gzip,
                        Some(Expected {
                            checksum: &file.info.checksum,
                            size: file.info.size,
                        }),
                    )
                    .await?;
                self.repository.store(path, file.info).await?;
            }
            ModFetch::Restamp { path, file } => {
                tracing::debug!(file = %file.info.filename, "updating blob metadata");
                self.repository.store(path, file.info).await?;
            }
        }
        Ok(())
    }

    /// Phase 2: extra files under the game directory, plus the server
    /// icon.
    pub async fn fetch_extras(&self, extras: &[RemoteFile], server_icon: Option<&RemoteFile>) {
        let mut tasks = JoinSet::new();
        for file in extras {
            let target = match resolve_under(&self.game_dir, &file.path) {
                Ok(target) => target,
                Err(err) => {
                    self.issues.error_with(
                        format!("Refusing to update `{}` outside the game directory", file.path),
                        err,
                    );
                    self.fail();
                    continue;
                }
            };
            self.spawn_extra(&mut tasks, file.clone(), target, file.path.clone());
        }
        if let Some(icon) = server_icon {
            self.spawn_extra(
                &mut tasks,
                icon.clone(),
                self.game_dir.join(SERVER_ICON_FILE),
                SERVER_ICON_FILE.to_string(),
            );
        }
        self.drain(tasks).await;
    }

    fn spawn_extra(
        &self,
        tasks: &mut JoinSet<()>,
        file: RemoteFile,
        target: PathBuf,
        label: String,
    ) {
        let this = self.clone();
        tasks.spawn(async move {
            if let Err(err) = this.fetch_extra(&file, &target, &label).await {
                this.issues.error_at(format!("Failed to update {label}"), &target, err);
                this.fail();
            }
        });
    }

    async fn fetch_extra(
        &self,
        file: &RemoteFile,
        target: &Path,
        label: &str,
    ) -> Result<(), TaskError> {
        if file.is_deletion() {
            if tokio::fs::try_exists(target).await? {
                tracing::info!(file = label, "deleting");
                tokio::fs::remove_file(target).await?;
            }
            return Ok(());
        }
        if !needs_replace(file, target).await {
            return Ok(());
        }

        tracing::info!(file = label, size = file.info.size, url = %file.url, "downloading");
        let expected = (!file.info.checksum.is_empty()).then_some(Expected {
            checksum: &file.info.checksum,
            size: file.info.size,
        });
        self.transfer
            .download_to_path(&file.url, target, file.gzip, expected)
            .await?;
        Ok(())
    }

    /// Phase 3: the three auxiliary merges, one task each. Failures here do
    /// not count against the cycle.
    pub async fn merge_auxiliary(&self, merges: AuxiliaryMerges) {
        let mut tasks = JoinSet::new();

        if let Some(entries) = merges.options {
            let this = self.clone();
            tasks.spawn(async move {
                let path = this.game_dir.join(OPTIONS_FILE);
                if let Err(err) = merge::options::merge_file(&path, &entries).await {
                    this.issues.warn_at("Failed to update options.txt", &path, err);
                }
            });
        }

        if let Some(entries) = merges.server_properties {
            let this = self.clone();
            tasks.spawn(async move {
                let path = this.game_dir.join(PROPERTIES_FILE);
                if let Err(err) = merge::properties::merge_file(&path, &entries).await {
                    this.issues.warn_at("Failed to update server.properties", &path, err);
                }
            });
        }

        if merges.server_list.is_some() || merges.servers_document.is_some() {
            let this = self.clone();
            tasks.spawn(async move {
                let path = this.game_dir.join(SERVERS_FILE);
                if let Err(err) = this
                    .merge_servers(&path, merges.server_list, merges.servers_document)
                    .await
                {
                    this.issues.warn_at("Failed to update the server list", &path, err);
                }
            });
        }

        self.drain(tasks).await;
    }

    async fn merge_servers(
        &self,
        path: &Path,
        inline: Option<Vec<ServerEntry>>,
        document: Option<RemoteFile>,
    ) -> Result<(), TaskError> {
        let mut entries = inline.unwrap_or_default();
        if let Some(document) = document {
            tracing::info!(url = %document.url, "fetching server list");
            let bytes = self.transfer.fetch_bytes(&document.url, document.gzip).await?;
            entries.extend(merge::servers::entries_from_document(&decode_document(&bytes)?));
        }
        let icon = merge::servers::fallback_icon(&self.game_dir).await;
        merge::servers::merge_file(path, &entries, &icon, &self.issues).await?;
        Ok(())
    }

    async fn drain(&self, mut tasks: JoinSet<()>) {
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                self.issues.error_with("Sync task panicked", err);
                self.fail();
            }
        }
    }
}

/// Lazy files are only fetched when absent; others whenever size or
/// checksum disagree with the descriptor.
async fn needs_replace(file: &RemoteFile, target: &Path) -> bool {
    if file.lazy {
        return !tokio::fs::try_exists(target).await.unwrap_or(false);
    }
    !checksum::file_matches(target, &file.info.checksum, file.info.size)
        .await
        .unwrap_or(false)
}

/// Remote server lists may arrive gzip-wrapped even when the transport was
/// not.
fn decode_document(bytes: &[u8]) -> Result<Compound, packsync_nbt::NbtError> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        packsync_nbt::read_compressed(bytes)
    } else {
        packsync_nbt::from_bytes(bytes)
    }
}
