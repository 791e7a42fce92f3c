//! Kernel parameters, applied live and persisted in a sysctl.d drop-in

use super::config_line::{LineStyle, find_value, upsert_line};
use convergence::{DesiredItem, Host, ItemState, Result};
use std::path::PathBuf;

/// Drop-in that persists every managed parameter across reboots
pub const DROP_IN: &str = "/etc/sysctl.d/99-hardening.conf";

const HEADER: &str = "# Managed by hardn; local edits to these keys are overwritten\n";

fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One sysctl key with its desired value
#[derive(Debug, Clone)]
pub struct SysctlParam {
    key: String,
    value: String,
    drop_in: PathBuf,
    live: bool,
}

impl SysctlParam {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: normalize(value),
            drop_in: PathBuf::from(DROP_IN),
            live: true,
        }
    }

    /// Only write the drop-in; the running kernel picks it up at boot
    pub fn persist_only(mut self) -> Self {
        self.live = false;
        self
    }

    fn persisted(&self, host: &dyn Host) -> Result<bool> {
        let contents = host.read_file(&self.drop_in)?.unwrap_or_default();
        Ok(find_value(&contents, &self.key, LineStyle::Equals).as_deref() == Some(self.value.as_str()))
    }
}

impl DesiredItem for SysctlParam {
    fn id(&self) -> String {
        format!("sysctl:{}", self.key)
    }

    fn description(&self) -> String {
        format!("Set {} = {}", self.key, self.value)
    }

    fn item_type(&self) -> &'static str {
        "sysctl"
    }

    /// The live kernel value; a key the kernel does not know is absent
    ///
    /// A live value that is right but missing from the drop-in is reported
    /// as "<value> (not persisted)" so it still gets written.
    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        if !self.live {
            let contents = host.read_file(&self.drop_in)?.unwrap_or_default();
            return Ok(find_value(&contents, &self.key, LineStyle::Equals)
                .map_or(ItemState::Absent, ItemState::Value));
        }
        let output = host.run("sysctl", &["-n", &self.key])?;
        if !output.success {
            log::debug!("sysctl {} unavailable: {}", self.key, output.stderr_str().trim());
            return Ok(ItemState::Absent);
        }
        let live = normalize(&output.stdout_str());
        if live != self.value || self.persisted(host)? {
            return Ok(ItemState::Value(live));
        }
        Ok(ItemState::Value(format!("{live} (not persisted)")))
    }

    fn desired_state(&self) -> ItemState {
        ItemState::value(self.value.clone())
    }

    fn backup_target(&self) -> Option<PathBuf> {
        Some(self.drop_in.clone())
    }

    /// Set the live value, then persist it
    ///
    /// A key the kernel rejects never reaches the drop-in, so it is not
    /// replayed at boot.
    fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
        if self.live {
            host.run_checked("sysctl", &["-w", &format!("{}={}", self.key, self.value)])?;
        }

        let existing = host.read_file(&self.drop_in)?;
        let persisted = existing
            .as_deref()
            .and_then(|c| find_value(c, &self.key, LineStyle::Equals));
        if persisted.as_deref() != Some(self.value.as_str()) {
            let base = existing.unwrap_or_else(|| HEADER.to_string());
            let updated = upsert_line(&base, &self.key, &self.value, LineStyle::Equals);
            host.write_file(&self.drop_in, &updated)?;
        }
        Ok(())
    }
}
