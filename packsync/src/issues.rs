use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Something the host should show to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    pub path: Option<PathBuf>,
    pub cause: Option<String>,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// Append-only sink shared by every task of a cycle. Each entry is also
/// emitted through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct IssueLog {
    entries: Arc<Mutex<Vec<Issue>>>,
}

impl IssueLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(Severity::Warning, message.into(), None, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Severity::Error, message.into(), None, None);
    }

    pub fn warn_at(&self, message: impl Into<String>, path: &Path, cause: impl fmt::Display) {
        self.push(
            Severity::Warning,
            message.into(),
            Some(path.to_path_buf()),
            Some(cause.to_string()),
        );
    }

    pub fn error_at(&self, message: impl Into<String>, path: &Path, cause: impl fmt::Display) {
        self.push(
            Severity::Error,
            message.into(),
            Some(path.to_path_buf()),
            Some(cause.to_string()),
        );
    }

    pub fn error_with(&self, message: impl Into<String>, cause: impl fmt::Display) {
        self.push(Severity::Error, message.into(), None, Some(cause.to_string()));
    }

    pub fn snapshot(&self) -> Vec<Issue> {
        self.lock().clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.lock()
            .iter()
            .filter(|issue| issue.severity == severity)
            .count()
    }

    fn push(
        &self,
        severity: Severity,
        message: String,
        path: Option<PathBuf>,
        cause: Option<String>,
    ) {
        let issue = Issue {
            severity,
            message,
            path,
            cause,
        };
        match severity {
            Severity::Warning => tracing::warn!("{issue}"),
            Severity::Error => tracing::error!("{issue}"),
        }
        self.lock().push(issue);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Issue>> {
        // A panicking task cannot leave a half-pushed Vec behind.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
