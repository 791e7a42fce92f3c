use super::{Step, StepId, applied};
use crate::config::Config;
use crate::items::{ConfigLine, LineStyle, ManagedFile, Package, ServiceState};
use convergence::{PlanRun, PostAction, StepPlan};

const AUDITD_CONF: &str = "/etc/audit/auditd.conf";
const AUDIT_RULES: &str = "/etc/audit/rules.d/99-hardening.rules";
const RSYSLOG_DROP_IN: &str = "/etc/rsyslog.d/99-hardening.conf";

/// auditd.conf settings used when the configuration has no `auditd` map
pub const DEFAULT_AUDITD: &[(&str, &str)] = &[
    ("max_log_file", "100"),
    ("num_logs", "5"),
    ("space_left_action", "email"),
    ("action_mail_acct", "root"),
    ("admin_space_left_action", "halt"),
    ("max_log_file_action", "rotate"),
    ("log_format", "RAW"),
    ("flush", "INCREMENTAL_ASYNC"),
    ("freq", "50"),
    ("priority_boost", "4"),
    ("name_format", "HOSTNAME"),
    ("local_events", "yes"),
    ("write_logs", "yes"),
    ("log_file", "/var/log/audit/audit.log"),
    ("log_group", "adm"),
];

pub const DEFAULT_AUDIT_RULES: &[&str] = &[
    // time changes
    "-a always,exit -F arch=b64 -S adjtimex -S settimeofday -k time-change",
    "-a always,exit -F arch=b32 -S adjtimex -S settimeofday -S stime -k time-change",
    "-a always,exit -F arch=b64 -S clock_settime -k time-change",
    "-a always,exit -F arch=b32 -S clock_settime -k time-change",
    "-w /etc/localtime -p wa -k time-change",
    // identity
    "-w /etc/group -p wa -k identity",
    "-w /etc/passwd -p wa -k identity",
    "-w /etc/gshadow -p wa -k identity",
    "-w /etc/shadow -p wa -k identity",
    "-w /etc/security/opasswd -p wa -k identity",
    // network environment
    "-a always,exit -F arch=b64 -S sethostname -S setdomainname -k system-locale",
    "-a always,exit -F arch=b32 -S sethostname -S setdomainname -k system-locale",
    "-w /etc/issue -p wa -k system-locale",
    "-w /etc/issue.net -p wa -k system-locale",
    "-w /etc/hosts -p wa -k system-locale",
    "-w /etc/network -p wa -k system-locale",
    // sudo
    "-w /var/log/sudo.log -p wa -k actions",
    "-w /etc/sudoers -p wa -k scope",
    "-w /etc/sudoers.d/ -p wa -k scope",
    // logins
    "-w /var/log/faillog -p wa -k logins",
    "-w /var/log/lastlog -p wa -k logins",
    "-w /var/log/tallylog -p wa -k logins",
    // init
    "-w /etc/init.d/ -p wa -k init",
    "-w /etc/init/ -p wa -k init",
    "-w /etc/inittab -p wa -k init",
    // libraries
    "-w /etc/ld.so.conf -p wa -k libpath",
    "-w /etc/ld.so.conf.d/ -p wa -k libpath",
    // kernel modules
    "-w /sbin/insmod -p x -k modules",
    "-w /sbin/rmmod -p x -k modules",
    "-w /sbin/modprobe -p x -k modules",
    "-a always,exit -F arch=b64 -S init_module -S delete_module -k modules",
    // mounts
    "-a always,exit -F arch=b64 -S mount -k mounts",
    "-a always,exit -F arch=b32 -S mount -k mounts",
    // deletions
    "-a always,exit -F arch=b64 -S unlink -S unlinkat -S rename -S renameat -k delete",
    "-a always,exit -F arch=b32 -S unlink -S unlinkat -S rename -S renameat -k delete",
    // MAC policy
    "-w /etc/selinux/ -p wa -k MAC-policy",
    "-w /usr/share/selinux/ -p wa -k MAC-policy",
    // boot and scheduling
    "-w /boot/grub/grub.cfg -p wa -k grub",
    "-w /etc/crontab -p wa -k cron",
    "-w /etc/cron.hourly/ -p wa -k cron",
    "-w /etc/cron.daily/ -p wa -k cron",
    "-w /etc/cron.weekly/ -p wa -k cron",
    "-w /etc/cron.monthly/ -p wa -k cron",
    "-w /etc/cron.d/ -p wa -k cron",
    "-w /var/spool/cron/crontabs/ -p wa -k cron",
    // immutable until reboot; must stay last
    "-e 2",
];

/// Rules file: flush, buffer and failure mode, then the rules
pub fn audit_rules_file(rules: &[String]) -> String {
    let mut out = String::from(
        "# Managed by hardn\n\n# Delete all existing rules\n-D\n\n# Buffer size\n-b 8192\n\n# Failure mode\n-f 1\n\n",
    );
    for rule in rules {
        out.push_str(rule.trim());
        out.push('\n');
    }
    out
}

// Permission directives only apply to actions that follow them
const RSYSLOG_CONF: &str = "# Managed by hardn

$FileOwner root
$FileGroup adm
$FileCreateMode 0640
$DirCreateMode 0755
$ActionFileDefaultTemplate RSYSLOG_TraditionalFileFormat

auth,authpriv.*                 /var/log/auth.log
cron.*                          /var/log/cron.log
kern.*                          /var/log/kern.log
mail.*                          /var/log/mail.log
user.*                          /var/log/user.log
daemon.*                        /var/log/daemon.log
local0,local1,local2,local3,local4,local5,local6,local7.*    /var/log/local.log
";

/// Step 5: auditd and rsyslog
pub struct Auditing;

impl Step for Auditing {
    fn id(&self) -> StepId {
        StepId::Auditing
    }

    fn plan(&self, config: &Config) -> StepPlan {
        let mut plan = StepPlan::new();
        let switches = &config.step5;

        if switches.install_auditd {
            plan.push(Package::new("auditd"));
            plan.push(Package::new("audispd-plugins"));
        }

        if switches.configure_auditd {
            let settings: Vec<(String, String)> = match &config.auditd {
                Some(custom) => custom.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                None => DEFAULT_AUDITD
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            };
            for (key, value) in settings {
                plan.push(ConfigLine::new("auditd", AUDITD_CONF, &key, &value, LineStyle::Equals));
            }
        }

        if switches.audit_rules {
            let rules: Vec<String> = config.audit_rules.clone().unwrap_or_else(|| {
                DEFAULT_AUDIT_RULES.iter().map(ToString::to_string).collect()
            });
            plan.push(ManagedFile::new(AUDIT_RULES, audit_rules_file(&rules)).with_mode("0640"));
        }

        if switches.rsyslog {
            plan.push(ManagedFile::new(RSYSLOG_DROP_IN, RSYSLOG_CONF).with_mode("0644"));
        }

        if switches.enable_auditd {
            plan.push(ServiceState::enabled("auditd"));
        }
        if switches.rsyslog {
            plan.push(ServiceState::enabled("rsyslog"));
        }

        plan.add_post_action(PostAction::new(
            "Load audit rules",
            "augenrules",
            &["--load"],
            "file:/etc/audit/rules.d/",
        ));
        plan.add_post_action(PostAction::new(
            "Reload auditd configuration",
            "systemctl",
            &["kill", "--signal=SIGHUP", "auditd"],
            "auditd:",
        ));
        if switches.restart_rsyslog {
            plan.add_post_action(PostAction::new(
                "Restart rsyslog",
                "systemctl",
                &["restart", "rsyslog"],
                "file:/etc/rsyslog.d/",
            ));
        }

        plan
    }

    fn notices(&self, run: &PlanRun) -> Vec<String> {
        if applied(run, "file:/etc/audit/rules.d/") {
            vec!["Audit rules loaded in immutable mode: further rule changes need a reboot".to_string()]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::FakeHost;
    use convergence::{ActionStatus, BackupStore, Engine, EngineOptions, ItemStatus, NoProgress};
    use std::collections::BTreeMap;

    #[test]
    fn test_rules_file_layout() {
        let rules: Vec<String> = DEFAULT_AUDIT_RULES.iter().map(ToString::to_string).collect();
        let contents = audit_rules_file(&rules);

        let lines: Vec<&str> = contents.lines().filter(|l| l.starts_with('-')).collect();
        assert_eq!(&lines[..3], &["-D", "-b 8192", "-f 1"]);
        assert_eq!(lines.last(), Some(&"-e 2"));
        assert!(contents.contains("-w /etc/shadow -p wa -k identity\n"));
    }

    #[test]
    fn test_custom_auditd_map_replaces_defaults() {
        let config = Config {
            auditd: Some(BTreeMap::from([("num_logs".to_string(), "10".to_string())])),
            ..Config::default()
        };
        let ids = Auditing.plan(&config).ids();

        let auditd: Vec<&String> = ids.iter().filter(|i| i.starts_with("auditd:")).collect();
        assert_eq!(auditd, vec!["auditd:num_logs"]);
    }

    #[test]
    fn test_service_switches() {
        let mut config = Config::default();
        config.step5.enable_auditd = false;
        config.step5.restart_rsyslog = false;

        let plan = Auditing.plan(&config);

        assert!(!plan.ids().contains(&"service:auditd".to_string()));
        assert!(plan.ids().contains(&"service:rsyslog".to_string()));
        assert!(plan.post_actions.iter().all(|a| a.command_line() != "systemctl restart rsyslog"));
        assert_eq!(plan.post_actions.len(), 2);
    }

    #[test]
    fn test_live_run_loads_rules_and_reloads_services() {
        let host = FakeHost::default();
        host.put_file(AUDITD_CONF, "num_logs = 5\nmax_log_file = 8\n");
        host.set_service("auditd", "enabled");
        host.set_service("rsyslog", "enabled");
        let mut engine = Engine::new(&host, EngineOptions::default(), BackupStore::new("/b"));
        let plan = Auditing.plan(&Config::default());

        let run = engine.run_plan("step5", &plan, &mut NoProgress);

        assert!(run.outcomes.iter().all(|o| o.status.is_success()), "{run:#?}");
        let conf = host.file(AUDITD_CONF).unwrap();
        assert!(conf.contains("max_log_file = 100\n"));
        assert!(conf.contains("log_group = adm\n"));
        assert!(host.file(AUDIT_RULES).unwrap().ends_with("-e 2\n"));
        assert_eq!(run.actions.len(), 3);
        assert!(run.actions.iter().all(|a| a.status == ActionStatus::Ran));
        assert!(host.ran("augenrules --load"));
        assert!(host.ran("systemctl kill --signal=SIGHUP auditd"));
        assert!(host.ran("systemctl restart rsyslog"));
        assert_eq!(Auditing.notices(&run).len(), 1);

        let again = engine.run_plan("step5", &plan, &mut NoProgress);
        assert!(again.outcomes.iter().all(|o| o.status == ItemStatus::Unchanged));
        assert!(again.actions.is_empty());
    }

    #[test]
    fn test_dry_run_lists_actions_without_running_them() {
        let host = FakeHost::default();
        let before = host.snapshot();
        let options = EngineOptions {
            dry_run: true,
            ..EngineOptions::default()
        };
        let mut engine = Engine::new(&host, options, BackupStore::new("/b"));

        let run = engine.run_plan("step5", &Auditing.plan(&Config::default()), &mut NoProgress);

        assert!(run.actions.iter().all(|a| a.status == ActionStatus::WouldRun));
        assert_eq!(run.actions.len(), 3);
        assert_eq!(host.snapshot(), before);
        assert_eq!(host.mutations(), 0);
    }
}
