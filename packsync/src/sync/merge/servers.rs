//! Multiplayer server list (`servers.dat`).

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use packsync_core::ServerEntry;
use packsync_nbt::{Compound, Tag};

use super::{MergeError, write_atomic};
use crate::issues::IssueLog;

const SERVERS_KEY: &str = "servers";

/// Server entries of a tagged-value document such as a remote
/// `servers.dat`.
pub fn entries_from_document(document: &Compound) -> Vec<ServerEntry> {
    let Some(list) = document.get(SERVERS_KEY).and_then(Tag::as_list) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(Tag::as_compound)
        .filter_map(|tag| {
            let name = tag.get_str("name")?.to_string();
            Some(ServerEntry {
                name,
                ip: tag.get_str("ip").unwrap_or_default().to_string(),
                icon: tag.get_str("icon").unwrap_or_default().to_string(),
                hidden: tag.get_byte("hidden").is_some_and(|value| value != 0),
            })
        })
        .collect()
}

/// Applies `remote` to the server list of `root`.
///
/// Local entries are keyed by name, first occurrence wins. A remote entry
/// with an ip replaces the local one in place or is appended; one without
/// an ip removes it. Entries left without an ip are dropped. Fields the game
/// stores that are not part of [`ServerEntry`] survive, as do other keys of
/// `root`.
pub fn merge(mut root: Compound, remote: &[ServerEntry], default_icon: &str) -> Compound {
    let mut servers: Vec<(String, Compound)> = Vec::new();
    if let Some(list) = root.get(SERVERS_KEY).and_then(Tag::as_list) {
        for tag in list.iter().filter_map(Tag::as_compound) {
            let Some(name) = tag.get_str("name").filter(|name| !name.is_empty()) else {
                continue;
            };
            if !servers.iter().any(|(existing, _)| existing == name) {
                servers.push((name.to_string(), tag.clone()));
            }
        }
    }

    for entry in remote.iter().filter(|entry| !entry.name.is_empty()) {
        let position = servers.iter().position(|(name, _)| *name == entry.name);
        if entry.ip.is_empty() {
            if let Some(position) = position {
                servers.remove(position);
            }
            continue;
        }

        let mut tag = position
            .map(|position| servers[position].1.clone())
            .unwrap_or_default();
        tag.insert("name", entry.name.as_str());
        tag.insert("ip", entry.ip.as_str());
        let icon = if entry.icon.is_empty() {
            default_icon
        } else {
            entry.icon.as_str()
        };
        if !icon.is_empty() {
            tag.insert("icon", icon);
        }
        if entry.hidden {
            tag.insert("hidden", true);
        } else {
            tag.remove("hidden");
        }

        match position {
            Some(position) => servers[position].1 = tag,
            None => servers.push((entry.name.clone(), tag)),
        }
    }

    let list = servers
        .into_iter()
        .map(|(_, tag)| tag)
        .filter(|tag| tag.get_str("ip").is_some_and(|ip| !ip.is_empty()))
        .map(Tag::Compound)
        .collect::<Vec<_>>();
    root.insert(SERVERS_KEY, Tag::List(list));
    root
}

/// Base64 of the installation's `server-icon.png`, or empty.
pub async fn fallback_icon(game_dir: &Path) -> String {
    match tokio::fs::read(game_dir.join("server-icon.png")).await {
        Ok(bytes) if !bytes.is_empty() => STANDARD.encode(bytes),
        _ => String::new(),
    }
}

/// Merges `remote` into the uncompressed document at `path`. An unreadable
/// document is reported and replaced. Returns whether the file was
/// rewritten.
pub async fn merge_file(
    path: &Path,
    remote: &[ServerEntry],
    default_icon: &str,
    issues: &IssueLog,
) -> Result<bool, MergeError> {
    let existing = match tokio::fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => return Err(MergeError::io(path)(err)),
    };
    let root = match existing.as_deref().map(packsync_nbt::from_bytes) {
        Some(Ok(root)) => root,
        Some(Err(err)) => {
            issues.warn_at("Replacing unreadable server list", path, err);
            Compound::new()
        }
        None => Compound::new(),
    };

    let merged = packsync_nbt::to_bytes(&merge(root, remote, default_icon))?;
    if existing.as_deref() == Some(merged.as_slice()) {
        return Ok(false);
    }
    tracing::info!(path = %path.display(), servers = remote.len(), "updating server list");
    write_atomic(path, &merged).await?;
    Ok(true)
}
