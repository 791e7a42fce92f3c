//! One `key value` setting inside a config file
//!
//! Used for sshd drop-ins (`Key value`) and auditd.conf (`key = value`).
//! Only the line for the key is touched; the rest of the file is kept.

use convergence::{DesiredItem, Host, ItemState, Result};
use std::path::PathBuf;

/// How a setting line is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    /// `Key value`, keys compared case-insensitively (sshd)
    Space,
    /// `key = value`
    Equals,
}

impl LineStyle {
    fn format(self, key: &str, value: &str) -> String {
        match self {
            Self::Space => format!("{key} {value}"),
            Self::Equals => format!("{key} = {value}"),
        }
    }

    /// Split a line into key and value, skipping blanks and comments
    fn parse(self, line: &str) -> Option<(&str, &str)> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        match self {
            Self::Space => {
                let (key, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
                Some((key, rest.trim()))
            }
            Self::Equals => {
                let (key, value) = line.split_once('=')?;
                Some((key.trim(), value.trim()))
            }
        }
    }

    fn key_matches(self, found: &str, key: &str) -> bool {
        match self {
            Self::Space => found.eq_ignore_ascii_case(key),
            Self::Equals => found == key,
        }
    }
}

/// Value of `key` in `contents`, first match wins
pub fn find_value(contents: &str, key: &str, style: LineStyle) -> Option<String> {
    contents.lines().find_map(|line| {
        let (found, value) = style.parse(line)?;
        style
            .key_matches(found, key)
            .then(|| value.split_whitespace().collect::<Vec<_>>().join(" "))
    })
}

/// Set `key` to `value`, replacing the first line for the key and dropping
/// later duplicates; appends when the key is missing
pub fn upsert_line(contents: &str, key: &str, value: &str, style: LineStyle) -> String {
    let wanted = style.format(key, value);
    let mut replaced = false;
    let mut lines: Vec<String> = Vec::new();

    for line in contents.lines() {
        let is_key = style
            .parse(line)
            .is_some_and(|(found, _)| style.key_matches(found, key));
        if !is_key {
            lines.push(line.to_string());
        } else if !replaced {
            lines.push(wanted.clone());
            replaced = true;
        }
    }
    if !replaced {
        lines.push(wanted);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// A single setting line in `path`
#[derive(Debug, Clone)]
pub struct ConfigLine {
    /// Id namespace, e.g. "sshd" or "auditd"
    namespace: &'static str,
    path: PathBuf,
    key: String,
    value: String,
    style: LineStyle,
}

impl ConfigLine {
    pub fn new(
        namespace: &'static str,
        path: impl Into<PathBuf>,
        key: &str,
        value: &str,
        style: LineStyle,
    ) -> Self {
        Self {
            namespace,
            path: path.into(),
            key: key.to_string(),
            value: value.trim().to_string(),
            style,
        }
    }

    fn updated(&self, current: &str) -> String {
        upsert_line(current, &self.key, &self.value, self.style)
    }
}

impl DesiredItem for ConfigLine {
    fn id(&self) -> String {
        format!("{}:{}", self.namespace, self.key)
    }

    fn description(&self) -> String {
        format!("Set {} to {} in {}", self.key, self.value, self.path.display())
    }

    fn item_type(&self) -> &'static str {
        "config_line"
    }

    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        let contents = host.read_file(&self.path)?;
        Ok(contents
            .and_then(|c| find_value(&c, &self.key, self.style))
            .map_or(ItemState::Absent, ItemState::Value))
    }

    fn desired_state(&self) -> ItemState {
        ItemState::value(self.value.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    fn backup_target(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }

    fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
        let current = host.read_file(&self.path)?.unwrap_or_default();
        host.write_file(&self.path, &self.updated(&current))
    }
}
