use super::{Step, StepId};
use crate::config::Config;
use crate::items::{ManagedFile, Ntp, Package, ServiceState, SystemUpgrades, Timezone};
use convergence::StepPlan;

const UNATTENDED_UPGRADES: &str = "/etc/apt/apt.conf.d/50unattended-upgrades";

const UNATTENDED_UPGRADES_CONF: &str = r#"Unattended-Upgrade::Allowed-Origins {
    "${distro_id}:${distro_codename}";
    "${distro_id}:${distro_codename}-security";
    "${distro_id}ESMApps:${distro_codename}-apps-security";
    "${distro_id}ESM:${distro_codename}-infra-security";
};

Unattended-Upgrade::AutoFixInterruptedDpkg "true";
Unattended-Upgrade::MinimalSteps "true";
Unattended-Upgrade::Remove-Unused-Kernel-Packages "true";
Unattended-Upgrade::Remove-New-Unused-Dependencies "true";
Unattended-Upgrade::Remove-Unused-Dependencies "true";
Unattended-Upgrade::Automatic-Reboot "false";
"#;

/// Step 1: updates, unattended upgrades, time
pub struct OsHardening;

impl Step for OsHardening {
    fn id(&self) -> StepId {
        StepId::Os
    }

    fn plan(&self, config: &Config) -> StepPlan {
        let mut plan = StepPlan::new();
        let switches = &config.step1;

        if switches.update_system {
            plan.push(SystemUpgrades);
        }

        if switches.unattended_upgrades && config.enable_unattended_upgrades {
            plan.push(Package::new("unattended-upgrades"));
            plan.push(ManagedFile::new(UNATTENDED_UPGRADES, UNATTENDED_UPGRADES_CONF).with_mode("0644"));
            plan.push(ServiceState::enabled("unattended-upgrades"));
        }

        if switches.timezone_ntp {
            plan.push(Timezone::new(&config.timezone));
            if config.enable_ntp {
                plan.push(Ntp);
            }
        }

        plan
    }
}
