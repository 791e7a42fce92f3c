use super::{Step, StepId, applied};
use crate::config::Config;
use crate::items::{AuthorizedKeys, ConfigLine, LineStyle, ManagedFile, UserAccount};
use convergence::{PlanRun, PostAction, StepPlan};

/// Sorted ahead of distribution drop-ins so its values win sshd's
/// first-match rule
pub const SSHD_DROP_IN: &str = "/etc/ssh/sshd_config.d/00-hardening.conf";

const BANNER_PATH: &str = "/etc/issue.net";

const BANNER: &str = "
***************************************************************************
                    AUTHORIZED ACCESS ONLY

This system is for the use of authorized users only. Individuals using
this computer system without authority, or in excess of their authority,
are subject to having all of their activities on this system monitored
and recorded by system personnel.

In the course of monitoring individuals improperly using this system, or
in the course of system maintenance, the activities of authorized users
may also be monitored.

Anyone using this system expressly consents to such monitoring and is
advised that if such monitoring reveals possible evidence of criminal
activity, system personnel may provide the evidence to law enforcement
officials.
***************************************************************************
";

const BASELINE: &[(&str, &str)] = &[
    ("PermitRootLogin", "no"),
    ("PermitEmptyPasswords", "no"),
    ("KbdInteractiveAuthentication", "no"),
    ("UsePAM", "yes"),
    ("X11Forwarding", "no"),
    ("MaxAuthTries", "3"),
    ("ClientAliveInterval", "300"),
    ("ClientAliveCountMax", "0"),
    ("LoginGraceTime", "60"),
    ("Banner", BANNER_PATH),
];

/// Effective sshd settings in file order
///
/// Password authentication stays on only while some configured user has a
/// password. Keys in `config.ssh` replace a baseline key with the same
/// name (case-insensitive) or are appended.
pub fn sshd_settings(config: &Config) -> Vec<(String, String)> {
    let mut settings: Vec<(String, String)> = BASELINE
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();

    let password_auth = if config.any_user_has_password() {
        log::info!("Password authentication stays enabled: some users have passwords");
        "yes"
    } else {
        "no"
    };
    settings.push(("PasswordAuthentication".to_string(), password_auth.to_string()));

    if !config.ssh_allowed_users.is_empty() {
        settings.push(("AllowUsers".to_string(), config.ssh_allowed_users.join(" ")));
    }

    for (key, value) in &config.ssh {
        match settings.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(existing) => existing.1.clone_from(value),
            None => settings.push((key.clone(), value.clone())),
        }
    }
    settings
}

/// Step 2: local accounts, their keys, and the SSH daemon
pub struct UserSsh;

impl Step for UserSsh {
    fn id(&self) -> StepId {
        StepId::UserSsh
    }

    fn plan(&self, config: &Config) -> StepPlan {
        let mut plan = StepPlan::new();

        if config.step2.create_users {
            for user in &config.users {
                plan.push(UserAccount::new(
                    &user.username,
                    user.groups.clone(),
                    &user.description,
                    user.password.clone(),
                ));
                if !user.ssh_keys.is_empty() {
                    plan.push(AuthorizedKeys::new(&user.username, &user.ssh_keys));
                }
            }
        }

        if config.step2.configure_ssh {
            for (key, value) in sshd_settings(config) {
                plan.push(ConfigLine::new("sshd", SSHD_DROP_IN, &key, &value, LineStyle::Space));
            }
            plan.push(ManagedFile::new(BANNER_PATH, BANNER).only_if_missing());

            plan.add_post_action(PostAction::new(
                "Validate sshd configuration",
                "sshd",
                &["-t"],
                "sshd:",
            ));
            plan.add_post_action(PostAction::new(
                "Restart SSH service",
                "systemctl",
                &["restart", "ssh"],
                "sshd:",
            ));
        }

        plan
    }

    fn notices(&self, run: &PlanRun) -> Vec<String> {
        if applied(run, "sshd:") {
            vec![
                "SSH configuration changed: keep this session open and confirm a new login works before disconnecting".to_string(),
            ]
        } else {
            Vec::new()
        }
    }
}
