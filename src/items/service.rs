//! systemd unit enablement

use convergence::{DesiredItem, Host, ItemState, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WantedState {
    /// Enabled and running
    Enabled,
    /// Disabled and stopped; a missing unit also counts
    Disabled,
}

impl WantedState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled, active",
            Self::Disabled => "disabled, inactive",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::Enabled => "enable",
            Self::Disabled => "disable",
        }
    }
}

/// Split "<unit file state>, <active state>"
fn split_state(state: &str) -> (&str, &str) {
    state.split_once(", ").unwrap_or((state, ""))
}

/// A systemd unit that should be enabled or disabled
#[derive(Debug, Clone)]
pub struct ServiceState {
    name: String,
    wanted: WantedState,
}

impl ServiceState {
    pub fn enabled(name: &str) -> Self {
        Self {
            name: name.to_string(),
            wanted: WantedState::Enabled,
        }
    }

    pub fn disabled(name: &str) -> Self {
        Self {
            name: name.to_string(),
            wanted: WantedState::Disabled,
        }
    }
}

impl DesiredItem for ServiceState {
    fn id(&self) -> String {
        format!("service:{}", self.name)
    }

    fn description(&self) -> String {
        format!("{} {}", capitalize(self.wanted.verb()), self.name)
    }

    fn item_type(&self) -> &'static str {
        "service"
    }

    /// `systemctl is-enabled` and `is-active`, as "enabled, active"
    ///
    /// Both exit non-zero for anything but the positive answer, so only
    /// stdout is read.
    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        let output = host.run("systemctl", &["is-enabled", &self.name])?;
        let unit_file = output.stdout_str().trim().to_string();
        if unit_file.is_empty() || unit_file == "not-found" {
            return Ok(ItemState::Absent);
        }
        let output = host.run("systemctl", &["is-active", &self.name])?;
        let active = match output.stdout_str().trim() {
            "" => "unknown".to_string(),
            state => state.to_string(),
        };
        Ok(ItemState::Value(format!("{unit_file}, {active}")))
    }

    fn desired_state(&self) -> ItemState {
        ItemState::value(self.wanted.as_str())
    }

    fn is_converged(&self, current: &ItemState) -> bool {
        let Some((unit_file, active)) = current.as_value().map(split_state) else {
            return self.wanted == WantedState::Disabled;
        };
        match self.wanted {
            WantedState::Enabled => {
                matches!(unit_file, "enabled" | "static" | "alias") && active == "active"
            }
            WantedState::Disabled => matches!(unit_file, "disabled" | "masked") && active != "active",
        }
    }

    fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
        host.run_checked("systemctl", &[self.wanted.verb(), "--now", &self.name])?;
        Ok(())
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
