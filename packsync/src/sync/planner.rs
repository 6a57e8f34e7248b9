use std::path::PathBuf;

use packsync_core::{FileInfo, RemoteFile};

use super::repository::{Repository, RepositoryEntry};
use crate::issues::IssueLog;
use crate::state::{LocalConfig, LocalState};

/// Outcome of comparing the cached state with the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Updates are paused locally; the server is not contacted.
    Paused,
    /// The cached mod list is current and every blob it needs is intact.
    UpToDate,
    Sync { from: String, to: String },
}

/// One repository action of the mods phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModFetch {
    Download(RemoteFile),
    /// The blob is already stored; only its metadata changed.
    Restamp { path: PathBuf, file: RemoteFile },
}

impl ModFetch {
    pub fn file(&self) -> &RemoteFile {
        match self {
            ModFetch::Download(file) | ModFetch::Restamp { file, .. } => file,
        }
    }
}

/// Verifies every enabled mod of `state` against the repository. Broken
/// entries are evicted so the next sync downloads them again. Returns
/// whether the cache can be trusted.
pub async fn check_cache(
    state: &LocalState,
    config: &LocalConfig,
    repository: &Repository,
    issues: &IssueLog,
) -> bool {
    let mut intact = true;
    for info in &state.mods {
        if config.is_disabled(&info.artifact.group) {
            continue;
        }
        if verified_entry(&info.checksum, &info.filename, repository, issues)
            .await
            .is_none()
        {
            intact = false;
        }
    }
    intact
}

/// The indexed entry for `checksum` if its blob still matches. A blob that
/// fails verification is evicted from the index.
async fn verified_entry(
    checksum: &str,
    filename: &str,
    repository: &Repository,
    issues: &IssueLog,
) -> Option<RepositoryEntry> {
    let Some(entry) = repository.lookup(checksum) else {
        tracing::info!(file = filename, "mod is missing from the repository");
        return None;
    };
    match repository.verify(&entry).await {
        Ok(true) => return Some(entry),
        Ok(false) => tracing::info!(
            file = filename,
            path = %entry.path.display(),
            "stored mod failed verification"
        ),
        Err(err) => issues.warn_at("Failed to verify stored mod", &entry.path, err),
    }
    repository.evict(checksum);
    None
}

/// The version to report to the server: the cached one, or empty when the
/// cache is broken so the server sends a full manifest.
pub fn effective_version(state: &LocalState, cache_intact: bool) -> &str {
    if cache_intact { &state.version } else { "" }
}

pub fn plan(local_version: &str, remote_version: &str) -> Plan {
    if !local_version.is_empty() && local_version == remote_version {
        Plan::UpToDate
    } else {
        Plan::Sync {
            from: local_version.to_string(),
            to: remote_version.to_string(),
        }
    }
}

/// Repository actions needed to realise `mods`. Every indexed blob is
/// verified first; one that no longer matches is downloaded again.
pub async fn plan_fetches(
    mods: &[RemoteFile],
    repository: &Repository,
    issues: &IssueLog,
) -> Vec<ModFetch> {
    let mut fetches = Vec::new();
    for file in mods {
        let info = &file.info;
        match verified_entry(&info.checksum, &info.filename, repository, issues).await {
            None => fetches.push(ModFetch::Download(file.clone())),
            Some(entry) if entry.info != *info => fetches.push(ModFetch::Restamp {
                path: entry.path,
                file: file.clone(),
            }),
            Some(_) => {}
        }
    }
    fetches
}

/// The new mod list: the manifest's when it sent one, else the previous.
pub fn next_mod_list(previous: &[FileInfo], mods: Option<&[RemoteFile]>) -> Vec<FileInfo> {
    let mut list: Vec<FileInfo> = match mods {
        Some(mods) => mods.iter().map(|file| file.info.clone()).collect(),
        None => previous.to_vec(),
    };
    sort_mods(&mut list);
    list
}

/// Case-insensitive filename order.
pub fn sort_mods(mods: &mut [FileInfo]) {
    mods.sort_by(|a, b| {
        a.filename
            .to_lowercase()
            .cmp(&b.filename.to_lowercase())
            .then_with(|| a.filename.cmp(&b.filename))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";

    fn remote(checksum: &str, filename: &str, size: u64) -> RemoteFile {
        RemoteFile::new(FileInfo::new(checksum, filename, size), "https://cdn.example/x")
    }

    async fn repo_with_abc(dir: &std::path::Path) -> (Repository, PathBuf) {
        let repo = Repository::new(dir.join("shared"), dir.join("local"));
        repo.prepare(&IssueLog::new()).await.unwrap();
        let file = remote(ABC_MD5, "abc.jar", 3);
        let path = repo.blob_path(&file).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"abc").unwrap();
        repo.store(path.clone(), file.info).await.unwrap();
        (repo, path)
    }

    #[test]
    fn plans_by_version() {
        assert_eq!(plan("v1", "v1"), Plan::UpToDate);
        assert_eq!(
            plan("v1", "v2"),
            Plan::Sync {
                from: "v1".into(),
                to: "v2".into()
            }
        );
        assert!(matches!(plan("", ""), Plan::Sync { .. }));
    }

    #[tokio::test]
    async fn deleted_blob_forces_resync() {
        let dir = tempdir().unwrap();
        let (repo, path) = repo_with_abc(dir.path()).await;
        let state = LocalState {
            version: "v1".into(),
            mods: vec![FileInfo::new(ABC_MD5, "abc.jar", 3)],
        };
        let config = LocalConfig::default();
        let issues = IssueLog::new();

        assert!(check_cache(&state, &config, &repo, &issues).await);
        assert_eq!(effective_version(&state, true), "v1");

        std::fs::remove_file(&path).unwrap();
        assert!(!check_cache(&state, &config, &repo, &issues).await);
        assert_eq!(effective_version(&state, false), "");
        assert!(repo.lookup(ABC_MD5).is_none());
        assert_eq!(
            plan("", "v1"),
            Plan::Sync {
                from: "".into(),
                to: "v1".into()
            }
        );
    }

    #[tokio::test]
    async fn disabled_mods_are_not_verified() {
        let dir = tempdir().unwrap();
        let repo = Repository::new(dir.path().join("shared"), dir.path().join("local"));
        let state = LocalState {
            version: "v1".into(),
            mods: vec![
                FileInfo::new(ABC_MD5, "abc.jar", 3)
                    .with_artifact(packsync_core::Artifact::new("abc", "1")),
            ],
        };
        let mut config = LocalConfig::default();
        config.disabled_artifacts.insert("abc".into(), true);

        assert!(check_cache(&state, &config, &repo, &IssueLog::new()).await);
    }

    #[tokio::test]
    async fn fetch_plan_downloads_missing_and_restamps_changed() {
        let dir = tempdir().unwrap();
        let (repo, path) = repo_with_abc(dir.path()).await;

        let same = remote(ABC_MD5, "abc.jar", 3);
        let mut renamed = remote(ABC_MD5, "abc-renamed.jar", 3);
        renamed.info.artifact = packsync_core::Artifact::new("abc", "2");
        let missing = remote("5d41402abc4b2a76b9719d911017c592", "hello.jar", 5);

        let issues = IssueLog::new();

        assert!(
            plan_fetches(std::slice::from_ref(&same), &repo, &issues)
                .await
                .is_empty()
        );
        assert_eq!(
            plan_fetches(std::slice::from_ref(&renamed), &repo, &issues).await,
            vec![ModFetch::Restamp {
                path,
                file: renamed.clone()
            }]
        );
        assert_eq!(
            plan_fetches(std::slice::from_ref(&missing), &repo, &issues).await,
            vec![ModFetch::Download(missing.clone())]
        );
    }

    #[tokio::test]
    async fn corrupt_stored_blob_is_downloaded_again() {
        let dir = tempdir().unwrap();
        let (repo, path) = repo_with_abc(dir.path()).await;
        std::fs::write(&path, b"XYZ").unwrap();

        let wanted = remote(ABC_MD5, "abc.jar", 3);
        let fetches = plan_fetches(std::slice::from_ref(&wanted), &repo, &IssueLog::new()).await;

        assert_eq!(fetches, vec![ModFetch::Download(wanted)]);
        assert!(repo.lookup(ABC_MD5).is_none());
    }

    #[test]
    fn mod_list_is_replaced_and_sorted() {
        let previous = vec![FileInfo::new("a", "old.jar", 1)];
        let manifest = vec![
            remote("b", "zeta.jar", 1),
            remote("c", "Alpha.jar", 1),
            remote("d", "beta.jar", 1),
        ];
        let list = next_mod_list(&previous, Some(&manifest));
        let names: Vec<_> = list.iter().map(|m| m.filename.as_str()).collect();
        assert_eq!(names, ["Alpha.jar", "beta.jar", "zeta.jar"]);

        assert_eq!(next_mod_list(&previous, None), previous);
    }
}
