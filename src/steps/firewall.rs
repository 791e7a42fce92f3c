use super::{Step, StepId, applied};
use crate::config::{Config, PortSpec};
use crate::items::{Direction, Package, ServiceState, UfwDefault, UfwEnabled, UfwRule};
use convergence::{DesiredItem, PlanRun, StepPlan};
use std::collections::BTreeSet;

/// Step 3: ufw and unneeded network services
pub struct NetworkSecurity;

impl Step for NetworkSecurity {
    fn id(&self) -> StepId {
        StepId::Firewall
    }

    fn plan(&self, config: &Config) -> StepPlan {
        let mut plan = StepPlan::new();

        if config.step3.configure_firewall {
            let spec = &config.firewall;
            plan.push(Package::new("ufw"));
            plan.push(UfwDefault::new(Direction::Incoming, spec.default_incoming));
            plan.push(UfwDefault::new(Direction::Outgoing, spec.default_outgoing));

            // The same port may appear in several rule sets
            let mut seen = BTreeSet::new();
            for (set, rule) in spec.rules() {
                let port = match PortSpec::parse(&rule.port) {
                    Ok(port) => port,
                    Err(reason) => {
                        log::warn!("Skipping port {:?} in {set}: {reason}", rule.port);
                        continue;
                    }
                };
                let item = UfwRule::allow(port, rule.protocol, &rule.description);
                if seen.insert(item.id()) {
                    plan.push(item);
                }
            }

            // Rules go in before activation so SSH is never cut off
            plan.push(UfwEnabled);
        }

        if config.step3.disable_services {
            for service in &config.disable_services {
                plan.push(ServiceState::disabled(service));
            }
        }

        plan
    }

    fn notices(&self, run: &PlanRun) -> Vec<String> {
        if applied(run, "ufw:") {
            vec!["Firewall rules changed: verify every required port is reachable".to_string()]
        } else {
            Vec::new()
        }
    }
}
