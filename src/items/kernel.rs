//! Loaded kernel modules

use convergence::{DesiredItem, Host, ItemState, Result};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct KernelModule {
    name: String,
}

impl KernelModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl DesiredItem for KernelModule {
    fn id(&self) -> String {
        format!("module:{}", self.name)
    }

    fn description(&self) -> String {
        format!("Load kernel module {}", self.name)
    }

    fn item_type(&self) -> &'static str {
        "kernel_module"
    }

    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        let modules = host.read_file(Path::new("/proc/modules"))?.unwrap_or_default();
        let loaded = modules
            .lines()
            .filter_map(|l| l.split_whitespace().next())
            .any(|m| m == self.name);
        Ok(if loaded {
            ItemState::value("loaded")
        } else {
            ItemState::Absent
        })
    }

    fn desired_state(&self) -> ItemState {
        ItemState::value("loaded")
    }

    fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
        host.run_checked("modprobe", &[&self.name])?;
        Ok(())
    }
}
