use std::path::PathBuf;

use packsync_core::FileInfo;

use super::repository::Repository;
use crate::issues::IssueLog;
use crate::state::LocalConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadPlan {
    /// Files for the host to load, in mod list order.
    pub paths: Vec<PathBuf>,
    /// New artifact groups were registered in the config.
    pub registry_changed: bool,
}

/// Resolves the mod list to repository paths, skipping disabled artifacts
/// and registering newly seen artifact groups as enabled.
pub async fn plan_load(
    mods: &[FileInfo],
    config: &mut LocalConfig,
    repository: &Repository,
    issues: &IssueLog,
) -> LoadPlan {
    let mut plan = LoadPlan::default();

    for info in mods {
        let group = &info.artifact.group;
        plan.registry_changed |= config.register(group);

        if config.is_disabled(group) {
            tracing::info!(
                file = %info.filename,
                artifact = %info.artifact,
                "skipping disabled mod"
            );
            continue;
        }

        let Some(entry) = repository.lookup(&info.checksum) else {
            issues.error(format!("Mod {} not found in the repository", info.filename));
            continue;
        };
        if !tokio::fs::try_exists(&entry.path).await.unwrap_or(false) {
            issues.error(format!(
                "Mod {} is missing from {}",
                info.filename,
                entry.path.display()
            ));
            continue;
        }

        tracing::info!(
            file = %info.filename,
            artifact = %info.artifact,
            checksum = %info.checksum,
            "loading mod"
        );
        plan.paths.push(entry.path);
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::Severity;
    use packsync_core::{Artifact, RemoteFile};
    use tempfile::tempdir;

    const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";
    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    async fn stored(repo: &Repository, info: FileInfo, body: &[u8]) -> PathBuf {
        let file = RemoteFile::new(info.clone(), "");
        let path = repo.blob_path(&file).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        repo.store(path.clone(), info).await.unwrap();
        path
    }

    #[tokio::test]
    async fn filters_disabled_and_reports_missing() {
        let dir = tempdir().unwrap();
        let repo = Repository::new(dir.path().join("shared"), dir.path().join("local"));
        let abc = FileInfo::new(ABC_MD5, "abc.jar", 3).with_artifact(Artifact::new("abc", "1"));
        let hello =
            FileInfo::new(HELLO_MD5, "hello.jar", 5).with_artifact(Artifact::new("hello", "1"));
        let ghost = FileInfo::new("00ff", "ghost.jar", 1);
        let abc_path = stored(&repo, abc.clone(), b"abc").await;
        stored(&repo, hello.clone(), b"hello").await;

        let mut config = LocalConfig::default();
        config.disabled_artifacts.insert("hello".into(), true);
        let issues = IssueLog::new();

        let plan = plan_load(&[abc, hello, ghost], &mut config, &repo, &issues).await;

        assert_eq!(plan.paths, vec![abc_path]);
        assert!(plan.registry_changed);
        assert_eq!(config.disabled_artifacts.get("abc"), Some(&false));
        assert_eq!(config.disabled_artifacts.get("hello"), Some(&true));
        assert_eq!(issues.count(Severity::Error), 1);
    }

    #[tokio::test]
    async fn known_groups_leave_registry_unchanged() {
        let dir = tempdir().unwrap();
        let repo = Repository::new(dir.path().join("shared"), dir.path().join("local"));
        let abc = FileInfo::new(ABC_MD5, "abc.jar", 3).with_artifact(Artifact::new("abc", "1"));
        stored(&repo, abc.clone(), b"abc").await;

        let mut config = LocalConfig::default();
        config.register("abc");
        let plan = plan_load(&[abc], &mut config, &repo, &IssueLog::new()).await;
        assert!(!plan.registry_changed);
        assert_eq!(plan.paths.len(), 1);
    }
}
