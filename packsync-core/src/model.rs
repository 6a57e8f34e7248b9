use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Features this client understands; the server tailors its response to
/// them.
pub const SUPPORTED_FEATURES: &[&str] = &["gzip", "session_id", "server_list"];

/// Logical package identity, independent of the file's bytes. Used for
/// filtering and display only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "artifact", default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl Artifact {
    pub const NONE: Artifact = Artifact {
        group: String::new(),
        version: String::new(),
    };

    pub fn new(group: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.group.is_empty() && self.version.is_empty()
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("no-artifact")
        } else {
            write!(f, "{}:{}", self.group, self.version)
        }
    }
}

/// Canonical description of one piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileInfo {
    pub checksum: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(flatten)]
    pub artifact: Artifact,
}

impl FileInfo {
    pub fn new(checksum: impl Into<String>, filename: impl Into<String>, size: u64) -> Self {
        Self {
            checksum: checksum.into(),
            filename: filename.into(),
            size,
            artifact: Artifact::NONE,
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = artifact;
        self
    }

    /// Extension including the dot, taken from the filename.
    pub fn extension(&self) -> &str {
        match self.filename.rfind('.') {
            Some(index) => &self.filename[index..],
            None => "",
        }
    }
}

/// A file the server wants present locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    #[serde(flatten)]
    pub info: FileInfo,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Only fetched when the target is absent; never re-verified.
    #[serde(default)]
    pub lazy: bool,
    /// The response body is gzip-compressed.
    #[serde(default)]
    pub gzip: bool,
    /// Stored in the per-installation repository root.
    #[serde(default)]
    pub local: bool,
}

impl RemoteFile {
    pub fn new(info: FileInfo, url: impl Into<String>) -> Self {
        Self {
            info,
            url: url.into(),
            path: String::new(),
            lazy: false,
            gzip: false,
            local: false,
        }
    }

    /// Extra files with this shape ask for their target to be removed.
    pub fn is_deletion(&self) -> bool {
        self.info.size == 0 && self.info.filename == "deleted"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueEntry {
    pub key: String,
    #[serde(deserialize_with = "lenient_string")]
    pub value: String,
    #[serde(default)]
    pub force: bool,
}

impl KeyValueEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, force: bool) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            force,
        }
    }
}

/// Server list entry as declared by the manifest. An empty `ip` removes the
/// entry with the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub hidden: bool,
}

/// Decoded sync response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyncManifest {
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Absent means the server did not send a mod list; the previous one
    /// stays in effect.
    #[serde(default)]
    pub mods: Option<Vec<RemoteFile>>,
    #[serde(default)]
    pub extra_files: Vec<RemoteFile>,
    #[serde(default)]
    pub server_list: Option<Vec<ServerEntry>>,
    /// A remote tagged-value document whose `servers` list is merged like
    /// `server_list`.
    #[serde(default)]
    pub servers: Option<RemoteFile>,
    #[serde(default)]
    pub server_icon: Option<RemoteFile>,
    #[serde(default)]
    pub options: Option<Vec<KeyValueEntry>>,
    #[serde(default)]
    pub server_properties: Option<Vec<KeyValueEntry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Mac,
    Solaris,
    Linux,
    Unknown,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Platform::Windows,
            "macos" | "ios" => Platform::Mac,
            "solaris" | "illumos" => Platform::Solaris,
            "linux" | "android" | "freebsd" | "netbsd" | "openbsd" | "dragonfly" => {
                Platform::Linux
            }
            _ => Platform::Unknown,
        }
    }
}

/// What the host tells us about the running game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameEnvironment {
    pub mc_version: String,
    pub loader_version: String,
    pub loader_api_version: String,
    pub dev: bool,
    pub dedicated_server: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRequest {
    pub pack_version: String,
    pub mc_version: String,
    pub loader_version: String,
    pub loader_api_version: String,
    pub platform: Platform,
    pub dev: bool,
    pub server: bool,
    pub supported_features: Vec<String>,
}

impl SyncRequest {
    pub fn new(pack_version: impl Into<String>, env: &GameEnvironment) -> Self {
        Self {
            pack_version: pack_version.into(),
            mc_version: env.mc_version.clone(),
            loader_version: env.loader_version.clone(),
            loader_api_version: env.loader_api_version.clone(),
            platform: Platform::current(),
            dev: env.dev,
            server: env.dedicated_server,
            supported_features: SUPPORTED_FEATURES.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Accepts JSON strings, numbers and booleans for config values.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(value) => Ok(value),
        serde_json::Value::Number(value) => Ok(value.to_string()),
        serde_json::Value::Bool(value) => Ok(value.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a string, number or boolean, found {other}"
        ))),
    }
}
