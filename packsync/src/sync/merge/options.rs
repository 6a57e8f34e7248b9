use std::path::Path;

use packsync_core::KeyValueEntry;

use super::{MergeError, apply_entries, read_optional, set_pair, write_atomic};

/// Data version written into a freshly created `options.txt`.
const BOOTSTRAP_VERSION: &str = "4325";

pub fn parse(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once(':') {
            set_pair(&mut pairs, key.to_string(), value.to_string());
        }
    }
    pairs
}

pub fn render(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{key}:{value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Merges `entries` into the game's `options.txt`. Returns whether the file
/// was rewritten.
pub async fn merge_file(path: &Path, entries: &[KeyValueEntry]) -> Result<bool, MergeError> {
    let mut pairs = match read_optional(path).await? {
        Some(text) => parse(&text),
        None => vec![("version".to_string(), BOOTSTRAP_VERSION.to_string())],
    };
    if !apply_entries(&mut pairs, entries) {
        return Ok(false);
    }
    tracing::info!(path = %path.display(), "updating options");
    write_atomic(path, render(&pairs).as_bytes()).await?;
    Ok(true)
}
