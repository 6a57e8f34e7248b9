//! Keeps a game installation in step with a remote pack manifest.
//!
//! One call to [`sync::engine::SyncEngine::run_cycle`] asks the pack server for the
//! current version, downloads whatever the content repository is missing,
//! merges server-declared settings into the local config files and returns
//! the list of files the host should load.

pub mod config;
pub mod issues;
pub mod state;
pub mod sync;
