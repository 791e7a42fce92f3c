//! Core types for convergence

use crate::backup::BackupRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Output;

/// Values longer than this are summarized by digest when displayed.
const DISPLAY_LIMIT: usize = 60;

/// Observed or desired state of a single item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ItemState {
    /// Nothing is there (file missing, package not installed, rule not added)
    Absent,
    /// Something is there, with its comparable value
    Value(String),
}

impl ItemState {
    /// Shorthand for `ItemState::Value`
    pub fn value(value: impl Into<String>) -> Self {
        Self::Value(value.into())
    }

    /// The value, if present
    pub fn as_value(&self) -> Option<&str> {
        match self {
            Self::Value(v) => Some(v),
            Self::Absent => None,
        }
    }

    /// Check if state represents absence
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Value(v) if v.is_empty() => write!(f, "\"\""),
            Self::Value(v) if v.contains('\n') || v.len() > DISPLAY_LIMIT => {
                let digest = blake3::hash(v.as_bytes()).to_hex();
                write!(f, "blake3:{} ({} bytes)", &digest[..16], v.len())
            }
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

/// What happened to one item during a convergence pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Current state already matched; nothing was written
    Unchanged,
    /// Dry run: a change is needed but was not made
    WouldChange,
    /// The writer ran successfully
    Applied,
    /// Reading, backing up or writing failed
    Failed,
}

impl ItemStatus {
    /// Everything except `Failed` counts as success
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Recorded result of converging one item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item_id: String,
    pub item_type: String,
    pub status: ItemStatus,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupRecord>,
}

impl ItemOutcome {
    pub fn new(item_id: String, item_type: &str) -> Self {
        Self {
            item_id,
            item_type: item_type.to_string(),
            status: ItemStatus::Unchanged,
            detail: String::new(),
            diff: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            backup: None,
        }
    }

    pub fn finish(mut self, status: ItemStatus, detail: impl Into<String>) -> Self {
        self.status = status;
        self.detail = detail.into();
        self
    }

    pub(crate) fn fail(mut self, detail: impl Into<String>, error: String) -> Self {
        self.errors.push(error);
        self.finish(ItemStatus::Failed, detail)
    }
}

/// Folded status of a whole step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Partial,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Fold item outcomes (plus step-level errors and warnings) into a step status.
    ///
    /// Any failure wins, then any warning makes the step partial.
    pub fn fold(outcomes: &[ItemOutcome], step_errors: usize, step_warnings: usize) -> Self {
        if step_errors > 0 || outcomes.iter().any(|o| !o.status.is_success()) {
            Self::Failed
        } else if step_warnings > 0 || outcomes.iter().any(|o| !o.warnings.is_empty()) {
            Self::Partial
        } else {
            Self::Success
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output from an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
    pub code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// Successful output carrying `stdout`
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into().into_bytes(),
            stderr: Vec::new(),
            success: true,
            code: Some(0),
        }
    }

    /// Failed output with an exit code and `stderr`
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into().into_bytes(),
            success: false,
            code: Some(code),
        }
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
