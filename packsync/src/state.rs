use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use packsync_core::{DEFAULT_AUTH, FileInfo};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::issues::IssueLog;

pub const CONFIG_FILE: &str = "config.json";
pub const STATE_FILE: &str = "state.json";
pub const LEGACY_INFO_FILE: &str = "pack-sync-info.json";

/// User-editable settings in `<game>/local/pack-sync/config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_auth")]
    pub auth: String,
    #[serde(default)]
    pub pause_updates: bool,
    /// Artifact group -> disabled. Groups are added as they are seen and
    /// never removed.
    #[serde(default)]
    pub disabled_artifacts: BTreeMap<String, bool>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            auth: default_auth(),
            pause_updates: false,
            disabled_artifacts: BTreeMap::new(),
        }
    }
}

impl LocalConfig {
    pub fn is_disabled(&self, group: &str) -> bool {
        !group.is_empty() && self.disabled_artifacts.get(group).copied().unwrap_or(false)
    }

    /// Records `group` as enabled unless it is already known. Returns whether
    /// the registry changed.
    pub fn register(&mut self, group: &str) -> bool {
        if group.is_empty() || self.disabled_artifacts.contains_key(group) {
            return false;
        }
        self.disabled_artifacts.insert(group.to_string(), false);
        true
    }
}

fn default_auth() -> String {
    DEFAULT_AUTH.to_string()
}

/// What the last successful cycle installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub mods: Vec<FileInfo>,
}

#[derive(Debug, Deserialize)]
struct LegacyInfo {
    #[serde(default)]
    version: String,
    #[serde(default = "default_auth")]
    auth: String,
    #[serde(default)]
    pause_updates: bool,
    #[serde(default)]
    ignored_mods: Vec<String>,
    #[serde(default)]
    mods: Vec<serde_json::Value>,
}

/// Config and state as loaded at the start of a cycle.
#[derive(Debug, Clone, Default)]
pub struct LocalFiles {
    pub config: LocalConfig,
    pub state: LocalState,
    /// The config file did not exist yet and should be written even when
    /// nothing else changes.
    pub config_created: bool,
}

pub struct LocalStore {
    dir: PathBuf,
    game_dir: PathBuf,
}

impl LocalStore {
    pub fn new(game_dir: &Path, dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            game_dir: game_dir.to_path_buf(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn legacy_path(&self) -> PathBuf {
        self.game_dir.join(LEGACY_INFO_FILE)
    }

    /// Loads config and state, migrating `pack-sync-info.json` when no
    /// config exists yet. An unreadable config is fatal; an unreadable
    /// state only forces a full sync.
    pub async fn load(&self, issues: &IssueLog) -> Result<LocalFiles, ConfigError> {
        let config_path = self.config_path();
        if read_optional::<LocalConfig>(&config_path).await?.is_none()
            && let Some(files) = self.migrate_legacy(issues).await?
        {
            return Ok(files);
        }

        let (config, config_created) = match read_optional::<LocalConfig>(&config_path).await? {
            Some(config) => (config, false),
            None => (LocalConfig::default(), true),
        };

        let state_path = self.state_path();
        let state = match read_optional::<LocalState>(&state_path).await {
            Ok(state) => state.unwrap_or_default(),
            Err(err) => {
                issues.warn_at("Discarding unreadable pack state", &state_path, &err);
                LocalState::default()
            }
        };

        Ok(LocalFiles {
            config,
            state,
            config_created,
        })
    }

    pub async fn save_config(&self, config: &LocalConfig) -> Result<(), ConfigError> {
        write_json_atomic(&self.config_path(), config).await
    }

    pub async fn save_state(&self, state: &LocalState) -> Result<(), ConfigError> {
        write_json_atomic(&self.state_path(), state).await
    }

    async fn migrate_legacy(&self, issues: &IssueLog) -> Result<Option<LocalFiles>, ConfigError> {
        let legacy_path = self.legacy_path();
        let Some(legacy) = read_optional::<LegacyInfo>(&legacy_path).await? else {
            return Ok(None);
        };
        tracing::info!(path = %legacy_path.display(), "migrating legacy pack info");

        let mut mods = Vec::with_capacity(legacy.mods.len());
        for entry in legacy.mods {
            match serde_json::from_value::<FileInfo>(entry) {
                Ok(info) => mods.push(info),
                Err(err) => {
                    issues.warn_at("Dropping malformed legacy mod entry", &legacy_path, err)
                }
            }
        }

        let config = LocalConfig {
            auth: legacy.auth,
            pause_updates: legacy.pause_updates,
            disabled_artifacts: legacy
                .ignored_mods
                .into_iter()
                .filter(|group| !group.is_empty())
                .map(|group| (group, true))
                .collect(),
        };
        let state = LocalState {
            version: legacy.version,
            mods,
        };

        self.save_config(&config).await?;
        if read_optional::<LocalState>(&self.state_path())
            .await
            .ok()
            .flatten()
            .is_none()
        {
            self.save_state(&state).await?;
        }

        let migrated = legacy_path.with_extension("json.migrated");
        tokio::fs::rename(&legacy_path, &migrated)
            .await
            .map_err(|source| ConfigError::Io {
                path: legacy_path.clone(),
                source,
            })?;

        Ok(Some(LocalFiles {
            config,
            state,
            config_created: false,
        }))
    }
}

async fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Pretty-printed JSON written to a sibling temp file and renamed into
/// place.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut body = serde_json::to_vec_pretty(value).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    body.push(b'\n');

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let temp = path.with_extension("json.tmp");
    tokio::fs::write(&temp, &body).await.map_err(io_err)?;
    tokio::fs::rename(&temp, path).await.map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(game: &Path) -> LocalStore {
        LocalStore::new(game, game.join("local/pack-sync"))
    }

    #[test]
    fn registry_is_append_only() {
        let mut config = LocalConfig::default();
        assert!(config.register("jei"));
        assert!(!config.register("jei"));
        assert!(!config.register(""));

        config.disabled_artifacts.insert("optifine".into(), true);
        assert!(!config.register("optifine"));
        assert!(config.is_disabled("optifine"));
        assert!(!config.is_disabled("jei"));
        assert!(!config.is_disabled(""));
    }

    #[tokio::test]
    async fn fresh_install_uses_defaults() {
        let dir = tempdir().unwrap();
        let files = store(dir.path()).load(&IssueLog::new()).await.unwrap();
        assert!(files.config_created);
        assert_eq!(files.config.auth, "%PACK_SYNC_TOKEN%");
        assert_eq!(files.state, LocalState::default());
    }

    #[tokio::test]
    async fn round_trips_config_and_state() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let mut config = LocalConfig::default();
        config.register("jei");
        let state = LocalState {
            version: "v3".into(),
            mods: vec![FileInfo::new("abc", "jei.jar", 3)],
        };
        store.save_config(&config).await.unwrap();
        store.save_state(&state).await.unwrap();

        let files = store.load(&IssueLog::new()).await.unwrap();
        assert!(!files.config_created);
        assert_eq!(files.config, config);
        assert_eq!(files.state, state);
        assert!(!store.dir.join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_state_is_discarded_with_warning() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        std::fs::create_dir_all(&store.dir).unwrap();
        std::fs::write(store.state_path(), "{broken").unwrap();

        let issues = IssueLog::new();
        let files = store.load(&issues).await.unwrap();
        assert_eq!(files.state, LocalState::default());
        assert_eq!(issues.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_config_is_fatal() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        std::fs::create_dir_all(&store.dir).unwrap();
        std::fs::write(store.config_path(), "[]").unwrap();

        assert!(matches!(
            store.load(&IssueLog::new()).await,
            Err(ConfigError::Json { .. })
        ));
    }

    #[tokio::test]
    async fn migrates_legacy_info_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(LEGACY_INFO_FILE),
            r#"{
                "version": "v7",
                "auth": "secret",
                "pause_updates": true,
                "ignored_mods": ["optifine"],
                "mods": [
                    {"checksum": "abc", "filename": "a.jar", "size": 1, "artifact": "a"},
                    {"filename": 5}
                ]
            }"#,
        )
        .unwrap();
        let store = store(dir.path());
        let issues = IssueLog::new();

        let files = store.load(&issues).await.unwrap();
        assert_eq!(files.config.auth, "secret");
        assert!(files.config.pause_updates);
        assert!(files.config.is_disabled("optifine"));
        assert_eq!(files.state.version, "v7");
        assert_eq!(files.state.mods.len(), 1);
        assert_eq!(issues.snapshot().len(), 1);

        assert!(!dir.path().join(LEGACY_INFO_FILE).exists());
        assert!(dir.path().join("pack-sync-info.json.migrated").exists());
        assert!(store.config_path().exists());
        assert!(store.state_path().exists());

        // Second load reads the migrated files.
        let again = store.load(&IssueLog::new()).await.unwrap();
        assert_eq!(again.config, files.config);
        assert_eq!(again.state, files.state);
    }
}
