//! Backups taken before a file is mutated
//!
//! Records are append-only for the lifetime of a run and backup files are
//! never deleted.

use crate::error::Result;
use crate::host::Host;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// A copy of a file taken before it was changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub timestamp: DateTime<Local>,
}

/// Where backups go, and what has been backed up so far
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
    records: Vec<BackupRecord>,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            records: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every backup taken so far, oldest first
    pub fn records(&self) -> &[BackupRecord] {
        &self.records
    }

    /// Backup location for `original` taken at `at`
    ///
    /// `/etc/ssh/sshd_config` maps to
    /// `<root>/etc/ssh/sshd_config.<YYYYmmdd_HHMMSS_micros>.bak`.
    pub fn backup_path_for(&self, original: &Path, at: DateTime<Local>) -> PathBuf {
        let relative: PathBuf = original
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());
        let stamped = format!("{file_name}.{}.bak", at.format("%Y%m%d_%H%M%S_%6f"));
        self.root.join(relative).with_file_name(stamped)
    }

    /// Copy `original` into the store if it exists
    ///
    /// Returns `None` when there is nothing to back up yet.
    pub fn backup(&mut self, host: &dyn Host, original: &Path) -> Result<Option<BackupRecord>> {
        if host.read_file(original)?.is_none() {
            log::debug!("No backup needed, {} does not exist yet", original.display());
            return Ok(None);
        }

        let timestamp = Local::now();
        let base = self.backup_path_for(original, timestamp);
        let mut backup_path = base.clone();
        let mut attempt = 1;
        while self.records.iter().any(|r| r.backup_path == backup_path) {
            backup_path = base.with_extension(format!("bak.{attempt}"));
            attempt += 1;
        }

        host.copy_file(original, &backup_path)?;
        log::info!(
            "Backed up {} to {}",
            original.display(),
            backup_path.display()
        );

        let record = BackupRecord {
            original_path: original.to_path_buf(),
            backup_path,
            timestamp,
        };
        self.records.push(record.clone());
        Ok(Some(record))
    }
}
