//! Timezone and NTP through timedatectl

use convergence::{DesiredItem, Host, ItemState, Result};

fn show(host: &dyn Host, property: &str) -> Result<String> {
    let value = host.run_checked("timedatectl", &["show", "-p", property, "--value"])?;
    Ok(value.trim().to_string())
}

#[derive(Debug, Clone)]
pub struct Timezone {
    zone: String,
}

impl Timezone {
    pub fn new(zone: &str) -> Self {
        Self {
            zone: zone.to_string(),
        }
    }
}

impl DesiredItem for Timezone {
    fn id(&self) -> String {
        "time:timezone".to_string()
    }

    fn description(&self) -> String {
        format!("Set timezone to {}", self.zone)
    }

    fn item_type(&self) -> &'static str {
        "time"
    }

    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        Ok(ItemState::Value(show(host, "Timezone")?))
    }

    fn desired_state(&self) -> ItemState {
        ItemState::value(self.zone.clone())
    }

    fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
        host.run_checked("timedatectl", &["set-timezone", &self.zone])?;
        Ok(())
    }
}

/// Network time synchronization switched on
#[derive(Debug, Clone, Default)]
pub struct Ntp;

impl DesiredItem for Ntp {
    fn id(&self) -> String {
        "time:ntp".to_string()
    }

    fn description(&self) -> String {
        "Enable NTP synchronization".to_string()
    }

    fn item_type(&self) -> &'static str {
        "time"
    }

    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        Ok(ItemState::Value(show(host, "NTP")?))
    }

    fn desired_state(&self) -> ItemState {
        ItemState::value("yes")
    }

    fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
        host.run_checked("timedatectl", &["set-ntp", "true"])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::FakeHost;
    use convergence::{BackupStore, Engine, EngineOptions, ItemStatus};

    #[test]
    fn test_timezone_and_ntp() {
        let host = FakeHost::default();
        let mut engine = Engine::new(&host, EngineOptions::default(), BackupStore::new("/b"));

        let tz = engine.converge(&Timezone::new("UTC"));
        assert_eq!(tz.detail, "changed Etc/UTC → UTC");
        assert_eq!(host.timezone(), "UTC");

        assert_eq!(engine.converge(&Ntp).detail, "changed no → yes");
        assert_eq!(engine.converge(&Ntp).status, ItemStatus::Unchanged);
    }
}
