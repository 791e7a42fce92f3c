//! apt packages and pending upgrades

use convergence::{DesiredItem, Host, ItemState, Result};

const INSTALLED: &str = "install ok installed";

/// A Debian package that must be installed
#[derive(Debug, Clone)]
pub struct Package {
    name: String,
}

impl Package {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl DesiredItem for Package {
    fn id(&self) -> String {
        format!("package:{}", self.name)
    }

    fn description(&self) -> String {
        format!("Install {}", self.name)
    }

    fn item_type(&self) -> &'static str {
        "package"
    }

    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        let output = host.run("dpkg-query", &["-W", "-f=${Status}", &self.name])?;
        if output.success && output.stdout_str().trim() == INSTALLED {
            Ok(ItemState::value("installed"))
        } else {
            Ok(ItemState::Absent)
        }
    }

    fn desired_state(&self) -> ItemState {
        ItemState::value("installed")
    }

    fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
        host.run_checked("apt-get", &["install", "-y", &self.name])?;
        Ok(())
    }
}

/// No upgrades pending for installed packages
///
/// The state is the number of packages `apt-get -s upgrade` would install.
/// Live runs refresh the package index first, so a stale index never hides
/// pending upgrades.
#[derive(Debug, Clone, Default)]
pub struct SystemUpgrades;

impl SystemUpgrades {
    fn pending(host: &dyn Host) -> Result<usize> {
        let listing = host.run_checked("apt-get", &["-s", "upgrade"])?;
        Ok(listing.lines().filter(|l| l.starts_with("Inst ")).count())
    }
}

impl DesiredItem for SystemUpgrades {
    fn id(&self) -> String {
        "upgrades:pending".to_string()
    }

    fn description(&self) -> String {
        "Apply pending package upgrades".to_string()
    }

    fn item_type(&self) -> &'static str {
        "upgrades"
    }

    fn prepare(&self, host: &dyn Host) -> Result<()> {
        host.run_checked("apt-get", &["update"])?;
        Ok(())
    }

    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        Ok(ItemState::value(Self::pending(host)?.to_string()))
    }

    fn desired_state(&self) -> ItemState {
        ItemState::value("0")
    }

    fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
        host.run_checked("apt-get", &["-y", "upgrade"])?;
        Ok(())
    }
}
