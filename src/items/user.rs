//! Local accounts and their SSH keys

use crate::config::Secret;
use convergence::{DesiredItem, Host, ItemState, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;

fn groups_value<'a>(groups: impl IntoIterator<Item = &'a String>) -> String {
    let joined: Vec<&str> = groups.into_iter().map(String::as_str).collect();
    format!("groups={}", joined.join(","))
}

/// An account that exists and belongs to at least `groups`
#[derive(Debug, Clone)]
pub struct UserAccount {
    name: String,
    groups: BTreeSet<String>,
    gecos: String,
    password: Option<Secret>,
}

impl UserAccount {
    pub fn new(name: &str, groups: BTreeSet<String>, gecos: &str, password: Option<Secret>) -> Self {
        Self {
            name: name.to_string(),
            groups,
            gecos: gecos.to_string(),
            password,
        }
    }

    fn parse_groups(value: &str) -> BTreeSet<String> {
        value
            .strip_prefix("groups=")
            .unwrap_or(value)
            .split(',')
            .filter(|g| !g.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

impl DesiredItem for UserAccount {
    fn id(&self) -> String {
        format!("user:{}", self.name)
    }

    fn description(&self) -> String {
        format!("Ensure user {} exists", self.name)
    }

    fn item_type(&self) -> &'static str {
        "user"
    }

    /// Group memberships from `id -nG`; a missing user is absent
    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        let output = host.run("id", &["-nG", &self.name])?;
        if !output.success {
            return Ok(ItemState::Absent);
        }
        let stdout = output.stdout_str();
        let groups: BTreeSet<String> = stdout.split_whitespace().map(ToString::to_string).collect();
        Ok(ItemState::Value(groups_value(&groups)))
    }

    fn desired_state(&self) -> ItemState {
        ItemState::Value(groups_value(&self.groups))
    }

    /// Extra groups the account already has are left alone
    fn is_converged(&self, current: &ItemState) -> bool {
        current
            .as_value()
            .is_some_and(|v| self.groups.is_subset(&Self::parse_groups(v)))
    }

    fn apply(&self, host: &dyn Host, current: &ItemState) -> Result<()> {
        if current.is_absent() {
            host.run_checked(
                "adduser",
                &["--disabled-password", "--gecos", &self.gecos, &self.name],
            )?;
            log::info!("Created user {}", self.name);

            // Only set on creation so operators can rotate it afterwards
            if let Some(password) = &self.password {
                let input = format!("{}:{}\n", self.name, password.expose());
                let output = host.run_with_input("chpasswd", &[], &input)?;
                if !output.success {
                    return Err(convergence::command_error("chpasswd", &[], &output));
                }
            }
        }

        let have = current.as_value().map(Self::parse_groups).unwrap_or_default();
        let missing: Vec<&str> = self
            .groups
            .iter()
            .filter(|g| !have.contains(*g))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            host.run_checked("usermod", &["-aG", &missing.join(","), &self.name])?;
        }
        Ok(())
    }
}

/// Keys that must appear in a user's authorized_keys
#[derive(Debug, Clone)]
pub struct AuthorizedKeys {
    user: String,
    keys: Vec<String>,
    path: PathBuf,
}

impl AuthorizedKeys {
    pub fn new(user: &str, keys: &[String]) -> Self {
        Self {
            user: user.to_string(),
            keys: keys.iter().map(|k| k.trim().to_string()).collect(),
            path: PathBuf::from(format!("/home/{user}/.ssh/authorized_keys")),
        }
    }

    fn missing<'a>(&'a self, contents: &str) -> Vec<&'a str> {
        let present: BTreeSet<&str> = contents.lines().map(str::trim).collect();
        self.keys
            .iter()
            .map(String::as_str)
            .filter(|k| !present.contains(k))
            .collect()
    }
}

impl DesiredItem for AuthorizedKeys {
    fn id(&self) -> String {
        format!("ssh_keys:{}", self.user)
    }

    fn description(&self) -> String {
        format!("Install {} SSH key(s) for {}", self.keys.len(), self.user)
    }

    fn item_type(&self) -> &'static str {
        "authorized_keys"
    }

    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        super::file_state(host, &self.path)
    }

    fn desired_state(&self) -> ItemState {
        let mut contents = self.keys.join("\n");
        contents.push('\n');
        ItemState::Value(contents)
    }

    fn is_converged(&self, current: &ItemState) -> bool {
        current
            .as_value()
            .is_some_and(|contents| self.missing(contents).is_empty())
    }

    fn backup_target(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }

    fn apply(&self, host: &dyn Host, current: &ItemState) -> Result<()> {
        let mut contents = current.as_value().unwrap_or_default().to_string();
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        for key in self.missing(&contents) {
            contents.push_str(key);
            contents.push('\n');
        }
        host.write_file(&self.path, &contents)?;

        let ssh_dir = format!("/home/{}/.ssh", self.user);
        let owner = format!("{0}:{0}", self.user);
        host.run_checked("chown", &["-R", &owner, &ssh_dir])?;
        host.run_checked("chmod", &["700", &ssh_dir])?;
        host.run_checked("chmod", &["600", &self.path.to_string_lossy()])?;
        Ok(())
    }
}
