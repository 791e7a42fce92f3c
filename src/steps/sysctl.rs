use super::{Step, StepId, applied};
use crate::config::Config;
use crate::items::{KernelModule, ManagedFile, SysctlParam};
use convergence::{PlanRun, StepPlan};

const BRIDGE_MODULE: &str = "br_netfilter";
const MODULES_LOAD: &str = "/etc/modules-load.d/br_netfilter.conf";

/// Network and kernel protections plus Kubernetes bridge settings
pub const DEFAULT_PARAMETERS: &[(&str, &str)] = &[
    ("net.ipv4.ip_forward", "1"),
    ("net.ipv4.conf.all.rp_filter", "1"),
    ("net.ipv4.conf.default.rp_filter", "1"),
    ("net.ipv4.conf.all.accept_source_route", "0"),
    ("net.ipv4.conf.default.accept_source_route", "0"),
    ("net.ipv4.conf.all.accept_redirects", "0"),
    ("net.ipv4.conf.default.accept_redirects", "0"),
    ("net.ipv4.conf.all.secure_redirects", "0"),
    ("net.ipv4.conf.default.secure_redirects", "0"),
    ("net.ipv4.conf.all.send_redirects", "0"),
    ("net.ipv4.conf.default.send_redirects", "0"),
    ("net.ipv4.icmp_echo_ignore_broadcasts", "1"),
    ("net.ipv4.icmp_ignore_bogus_error_responses", "1"),
    ("net.ipv4.tcp_syncookies", "1"),
    ("net.ipv6.conf.all.disable_ipv6", "1"),
    ("net.ipv6.conf.default.disable_ipv6", "1"),
    ("net.ipv6.conf.lo.disable_ipv6", "1"),
    ("kernel.kptr_restrict", "1"),
    ("kernel.dmesg_restrict", "1"),
    ("kernel.yama.ptrace_scope", "1"),
    ("fs.protected_hardlinks", "1"),
    ("fs.protected_symlinks", "1"),
    ("fs.suid_dumpable", "0"),
    ("vm.mmap_min_addr", "65536"),
    ("net.bridge.bridge-nf-call-iptables", "1"),
    ("net.bridge.bridge-nf-call-ip6tables", "1"),
];

/// Parameters to converge, defaults first
///
/// Default `net.bridge.*` keys only exist once `br_netfilter` is loaded, so
/// they are left out when the module is not managed. Keys given explicitly
/// are always kept.
pub fn effective_parameters(config: &Config) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = Vec::new();

    if config.sysctl.include_defaults {
        params.extend(
            DEFAULT_PARAMETERS
                .iter()
                .filter(|(k, _)| config.step4.load_bridge_module || !k.starts_with("net.bridge."))
                .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        );
    }

    for (key, value) in &config.sysctl.parameters {
        match params.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1.clone_from(value),
            None => params.push((key.clone(), value.clone())),
        }
    }
    params
}

/// Step 4: kernel parameters and the bridge netfilter module
pub struct KernelHardening;

impl Step for KernelHardening {
    fn id(&self) -> StepId {
        StepId::Sysctl
    }

    fn plan(&self, config: &Config) -> StepPlan {
        let mut plan = StepPlan::new();

        if config.step4.load_bridge_module {
            plan.push(KernelModule::new(BRIDGE_MODULE));
            plan.push(ManagedFile::new(MODULES_LOAD, format!("{BRIDGE_MODULE}\n")).with_mode("0644"));
        }

        if config.step4.configure_sysctl {
            for (key, value) in effective_parameters(config) {
                let param = SysctlParam::new(&key, &value);
                if config.step4.apply_sysctl {
                    plan.push(param);
                } else {
                    plan.push(param.persist_only());
                }
            }
        }

        plan
    }

    fn notices(&self, run: &PlanRun) -> Vec<String> {
        if applied(run, "sysctl:") {
            vec!["Kernel parameters changed: some take full effect only after a reboot".to_string()]
        } else {
            Vec::new()
        }
    }
}
