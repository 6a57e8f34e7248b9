use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use packsync_core::{PackSyncClient, PackSyncError, SyncManifest, SyncRequest, resolve_token};
use thiserror::Error;

use super::fetch::{AuxiliaryMerges, Fetcher};
use super::loader::plan_load;
use super::planner::{self, Plan};
use super::repository::{Repository, RepositoryError};
use super::transfer::TransferClient;
use crate::config::{ConfigError, EngineConfig, PackConfig};
use crate::issues::{Issue, IssueLog};
use crate::state::{LocalFiles, LocalStore};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("client error: {0}")]
    Client(#[from] PackSyncError),
}

/// Values learned from the server during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncContext {
    pub session_id: Option<String>,
    pub pack_id: Option<String>,
    pub remote_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Files for the host to load.
    pub load: Vec<PathBuf>,
    pub issues: Vec<Issue>,
    /// `None` when the server could not be asked for its version.
    pub plan: Option<Plan>,
    /// The pack version that is now installed.
    pub version: String,
    /// Failed download or extra-file tasks; non-zero means nothing was
    /// persisted.
    pub failures: usize,
}

pub struct SyncEngine {
    config: EngineConfig,
    context: SyncContext,
    client: Option<PackSyncClient>,
}

impl SyncEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            context: SyncContext::default(),
            client: None,
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    /// Runs one sync cycle. Only unusable configuration is an error; network
    /// and per-file problems end up in [`CycleOutcome::issues`] and the
    /// cached mod list is loaded instead.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, EngineError> {
        let started = Instant::now();
        let issues = IssueLog::new();
        let game_dir = self.config.game_dir.clone();

        let pack = PackConfig::load(&game_dir)?;
        let store = LocalStore::new(&game_dir, self.config.local_dir());
        let mut files = store.load(&issues).await?;

        let token = resolve_token(&files.config.auth);
        let mut client =
            PackSyncClient::new(&pack.api, pack.pack_code.clone(), token.as_deref())?;
        self.context.pack_id = pack.pack_id.clone();

        let repository = Arc::new(Repository::new(
            &self.config.repo_root,
            &self.config.local_repo_root,
        ));
        repository.prepare(&issues).await?;
        let discovered = repository.discover(&issues).await;
        tracing::info!(
            files = discovered,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "repository scanned"
        );

        let cache_intact =
            planner::check_cache(&files.state, &files.config, &repository, &issues).await;
        let local_version = planner::effective_version(&files.state, cache_intact).to_string();

        let plan = if files.config.pause_updates {
            tracing::info!(version = %files.state.version, "pack updates are paused");
            Plan::Paused
        } else {
            match client.fetch_version().await {
                Ok(info) => {
                    if info.session_id.is_some() {
                        self.context.session_id = info.session_id;
                    }
                    if info.pack_id.is_some() {
                        self.context.pack_id = info.pack_id;
                    }
                    self.context.remote_version = Some(info.version.clone());
                    client.set_session_id(self.context.session_id.clone());
                    planner::plan(&local_version, &info.version)
                }
                Err(err) => {
                    report_client_error(&issues, "Failed to check for pack updates", &err);
                    self.client = Some(client);
                    return self
                        .finish_cached(&store, files, None, &repository, issues, 0)
                        .await;
                }
            }
        };

        let Plan::Sync { from, to } = plan.clone() else {
            if plan == Plan::UpToDate {
                tracing::info!(version = %files.state.version, "pack is up to date");
            }
            self.client = Some(client);
            return self
                .finish_cached(&store, files, Some(plan), &repository, issues, 0)
                .await;
        };
        tracing::info!(from = %from, to = %to, "pack update found");

        let request = SyncRequest::new(from.as_str(), &self.config.environment);
        let manifest = match client.sync(&request).await {
            Ok(manifest) => manifest,
            Err(err) => {
                report_client_error(&issues, "Failed to update the pack", &err);
                self.client = Some(client);
                return self
                    .finish_cached(&store, files, Some(plan), &repository, issues, 0)
                    .await;
            }
        };
        let transfer =
            TransferClient::new(client.http().clone(), self.config.download_concurrency);
        self.client = Some(client);

        for warning in &manifest.warnings {
            issues.warn(warning.clone());
        }
        if !manifest.errors.is_empty() {
            for error in &manifest.errors {
                issues.error(error.clone());
            }
            return self
                .finish_cached(&store, files, Some(plan), &repository, issues, 0)
                .await;
        }

        let fetcher = Fetcher::new(&game_dir, Arc::clone(&repository), transfer, issues.clone());
        let SyncManifest {
            mods,
            extra_files,
            server_list,
            servers,
            server_icon,
            options,
            server_properties,
            ..
        } = manifest;

        if let Some(mods) = &mods {
            let fetches = planner::plan_fetches(mods, &repository, &issues).await;
            fetcher.fetch_mods(fetches).await;
        }
        if fetcher.failures() == 0 {
            fetcher.fetch_extras(&extra_files, server_icon.as_ref()).await;
        }
        if fetcher.failures() > 0 {
            let failures = fetcher.failures();
            return self
                .finish_cached(&store, files, Some(plan), &repository, issues, failures)
                .await;
        }

        fetcher
            .merge_auxiliary(AuxiliaryMerges {
                options,
                server_properties,
                server_list,
                servers_document: servers,
            })
            .await;

        files.state.mods = planner::next_mod_list(&files.state.mods, mods.as_deref());
        files.state.version = to;
        let failures = fetcher.failures();
        let outcome = self
            .finish(&store, files, Some(plan), &repository, issues, failures, true)
            .await;
        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "pack sync finished");
        Ok(outcome)
    }

    /// Tells the server the session is over. Failures are only logged.
    pub async fn shutdown(&self) {
        let Some(client) = &self.client else {
            return;
        };
        if client.session_id().is_none() {
            return;
        }
        if let Err(err) = client.exit().await {
            tracing::debug!(error = %err, "exit notification failed");
        }
    }

    async fn finish_cached(
        &self,
        store: &LocalStore,
        files: LocalFiles,
        plan: Option<Plan>,
        repository: &Repository,
        issues: IssueLog,
        failures: usize,
    ) -> Result<CycleOutcome, EngineError> {
        Ok(self
            .finish(store, files, plan, repository, issues, failures, false)
            .await)
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        store: &LocalStore,
        mut files: LocalFiles,
        plan: Option<Plan>,
        repository: &Repository,
        issues: IssueLog,
        failures: usize,
        state_changed: bool,
    ) -> CycleOutcome {
        let load = plan_load(&files.state.mods, &mut files.config, repository, &issues).await;

        if failures == 0 {
            if state_changed && let Err(err) = store.save_state(&files.state).await {
                issues.error_at("Failed to save pack state", &store.state_path(), err);
            }
            if (load.registry_changed || files.config_created)
                && let Err(err) = store.save_config(&files.config).await
            {
                issues.error_at("Failed to save pack config", &store.config_path(), err);
            }
        } else {
            tracing::warn!(failures, "sync had failures, keeping previous state");
        }

        CycleOutcome {
            load: load.paths,
            issues: issues.snapshot(),
            plan,
            version: files.state.version,
            failures,
        }
    }
}

fn report_client_error(issues: &IssueLog, message: &str, err: &PackSyncError) {
    if err.is_recoverable() {
        issues.warn(format!("{message}: {err}"));
    } else {
        issues.error(format!("{message}: {err}"));
    }
}
