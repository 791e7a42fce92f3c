//! Whole files whose contents are fully managed

use super::{file_state, unified_diff};
use convergence::{DesiredItem, Host, ItemState, Result};
use std::path::PathBuf;

/// A file with exact desired contents
#[derive(Debug, Clone)]
pub struct ManagedFile {
    path: PathBuf,
    contents: String,
    mode: Option<&'static str>,
    only_if_missing: bool,
}

impl ManagedFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            mode: None,
            only_if_missing: false,
        }
    }

    /// chmod applied after every write, e.g. "0640"
    pub fn with_mode(mut self, mode: &'static str) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Create the file if missing but never touch an existing one
    pub fn only_if_missing(mut self) -> Self {
        self.only_if_missing = true;
        self
    }
}

impl DesiredItem for ManagedFile {
    fn id(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn description(&self) -> String {
        if self.only_if_missing {
            format!("Create {} if missing", self.path.display())
        } else {
            format!("Write {}", self.path.display())
        }
    }

    fn item_type(&self) -> &'static str {
        "file"
    }

    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        file_state(host, &self.path)
    }

    fn desired_state(&self) -> ItemState {
        ItemState::value(self.contents.clone())
    }

    fn is_converged(&self, current: &ItemState) -> bool {
        if self.only_if_missing {
            !current.is_absent()
        } else {
            *current == self.desired_state()
        }
    }

    fn backup_target(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }

    fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
        host.write_file(&self.path, &self.contents)?;
        if let Some(mode) = self.mode {
            host.run_checked("chmod", &[mode, &self.path.to_string_lossy()])?;
        }
        Ok(())
    }

    fn preview(&self, current: &ItemState) -> Option<String> {
        let old = current.as_value().unwrap_or_default();
        Some(unified_diff(&self.path, old, &self.contents))
    }
}
