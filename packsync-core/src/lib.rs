mod auth;
mod client;
mod model;

pub use auth::{DEFAULT_AUTH, resolve_token, resolve_token_with};
pub use client::{
    ApiErrorClass, PACK_ID_HEADER, PackSyncClient, PackSyncError, SESSION_HEADER, VersionInfo,
};
pub use model::{
    Artifact, FileInfo, GameEnvironment, KeyValueEntry, Platform, RemoteFile, ServerEntry,
    SUPPORTED_FEATURES, SyncManifest, SyncRequest,
};
