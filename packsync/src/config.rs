use std::io;
use std::path::{Path, PathBuf};

use packsync_core::GameEnvironment;
use serde::Deserialize;
use thiserror::Error;

pub const PACK_CONFIG_FILE: &str = "mods/pack-sync.json";
pub const LOCAL_DIR: &str = "local/pack-sync";

const DEFAULT_REPO_DIR: &str = ".latvian.dev/pack-sync";
const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("pack config not found at {0}")]
    Missing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("pack config at {path} has an empty `{field}`")]
    EmptyField { path: PathBuf, field: &'static str },
}

/// Shipped with the pack in `mods/pack-sync.json`; never written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackConfig {
    pub api: String,
    pub pack_code: String,
    #[serde(default)]
    pub pack_id: Option<String>,
}

impl PackConfig {
    pub fn load(game_dir: &Path) -> Result<Self, ConfigError> {
        let path = game_dir.join(PACK_CONFIG_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::Missing(path));
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        let config: PackConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?;
        if config.api.trim().is_empty() {
            return Err(ConfigError::EmptyField { path, field: "api" });
        }
        if config.pack_code.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                path,
                field: "pack_code",
            });
        }
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub game_dir: PathBuf,
    /// Shared repository, usually under the user's home directory.
    pub repo_root: PathBuf,
    /// Per-installation repository used for `local` files and as fallback.
    pub local_repo_root: PathBuf,
    pub download_concurrency: usize,
    pub environment: GameEnvironment,
}

impl EngineConfig {
    /// Defaults with the repository at `repo_root` and no host environment.
    pub fn new(game_dir: impl Into<PathBuf>, repo_root: impl Into<PathBuf>) -> Self {
        let game_dir = game_dir.into();
        Self {
            local_repo_root: local_repo_root(&game_dir),
            game_dir,
            repo_root: repo_root.into(),
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            environment: GameEnvironment::default(),
        }
    }

    pub fn from_env(game_dir: impl Into<PathBuf>) -> Self {
        Self::from_lookup(game_dir, dirs::home_dir(), |name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(game_dir: impl Into<PathBuf>, home: Option<PathBuf>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let game_dir = game_dir.into();
        let repo_root = lookup("PACK_SYNC_REPO_DIRECTORY")
            .filter(|value| !value.trim().is_empty())
            .map(|value| match &home {
                Some(home) => expand_with_home(value.trim(), home),
                None => PathBuf::from(value.trim()),
            })
            .or_else(|| home.as_ref().map(|home| home.join(DEFAULT_REPO_DIR)))
            .unwrap_or_else(|| {
                tracing::warn!("home directory is unavailable, using the local repository");
                local_repo_root(&game_dir)
            });
        let download_concurrency = lookup("PACK_SYNC_DOWNLOAD_CONCURRENCY")
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_DOWNLOAD_CONCURRENCY);
        let environment = GameEnvironment {
            mc_version: lookup("PACK_SYNC_MC_VERSION").unwrap_or_default(),
            loader_version: lookup("PACK_SYNC_LOADER_VERSION").unwrap_or_default(),
            loader_api_version: lookup("PACK_SYNC_LOADER_API_VERSION").unwrap_or_default(),
            dev: read_bool(lookup("PACK_SYNC_DEV").as_deref()),
            dedicated_server: read_bool(lookup("PACK_SYNC_SERVER").as_deref()),
        };

        Self {
            local_repo_root: local_repo_root(&game_dir),
            game_dir,
            repo_root,
            download_concurrency,
            environment,
        }
    }

    pub fn with_environment(mut self, environment: GameEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_download_concurrency(mut self, limit: usize) -> Self {
        self.download_concurrency = limit.max(1);
        self
    }

    /// `<game>/local/pack-sync`, home of the mutable config and state.
    pub fn local_dir(&self) -> PathBuf {
        self.game_dir.join(LOCAL_DIR)
    }
}

fn local_repo_root(game_dir: &Path) -> PathBuf {
    game_dir.join(LOCAL_DIR).join("repository")
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_bool(value: Option<&str>) -> bool {
    value
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}
