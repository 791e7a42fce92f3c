//! The five hardening steps
//!
//! Each step turns the configuration into a [`StepPlan`]: an ordered list
//! of desired items plus the follow-up commands to run when some of them
//! changed. Planning is pure; nothing here touches the host.

mod auditing;
mod firewall;
mod os;
mod sysctl;
mod user_ssh;

pub use auditing::Auditing;
pub use firewall::NetworkSecurity;
pub use os::OsHardening;
pub use sysctl::KernelHardening;
pub use user_ssh::UserSsh;

use crate::config::Config;
use convergence::{ItemStatus, PlanRun, StepPlan};
use std::fmt;

/// Step identity; the declaration order is the execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepId {
    Os,
    UserSsh,
    Firewall,
    Sysctl,
    Auditing,
}

impl StepId {
    pub const ALL: [Self; 5] = [
        Self::Os,
        Self::UserSsh,
        Self::Firewall,
        Self::Sysctl,
        Self::Auditing,
    ];

    pub fn number(self) -> u8 {
        match self {
            Self::Os => 1,
            Self::UserSsh => 2,
            Self::Firewall => 3,
            Self::Sysctl => 4,
            Self::Auditing => 5,
        }
    }

    /// "step1" .. "step5", used in results and file names
    pub fn key(self) -> String {
        format!("step{}", self.number())
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Os => "OS Hardening",
            Self::UserSsh => "User & SSH Hardening",
            Self::Firewall => "Network Security",
            Self::Sysctl => "Kernel & Sysctl Hardening",
            Self::Auditing => "Auditing & Logging",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {}: {}", self.number(), self.name())
    }
}

/// A named group of items converged together
pub trait Step {
    fn id(&self) -> StepId;

    fn name(&self) -> &'static str {
        self.id().name()
    }

    /// Build the items for this step from the configuration
    fn plan(&self, config: &Config) -> StepPlan;

    /// Things the operator should know after a live run
    fn notices(&self, _run: &PlanRun) -> Vec<String> {
        Vec::new()
    }
}

/// Every step, in execution order
pub fn standard_steps() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(OsHardening),
        Box::new(UserSsh),
        Box::new(NetworkSecurity),
        Box::new(KernelHardening),
        Box::new(Auditing),
    ]
}

/// Whether any item with an id starting with `prefix` was applied
pub(crate) fn applied(run: &PlanRun, prefix: &str) -> bool {
    run.outcomes
        .iter()
        .any(|o| o.status == ItemStatus::Applied && o.item_id.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_in_fixed_order() {
        let ids: Vec<StepId> = standard_steps().iter().map(|s| s.id()).collect();
        assert_eq!(ids, StepId::ALL.to_vec());
        assert!(StepId::Os < StepId::Auditing);
        assert_eq!(StepId::Sysctl.key(), "step4");
        assert_eq!(StepId::Firewall.to_string(), "Step 3: Network Security");
    }
}
