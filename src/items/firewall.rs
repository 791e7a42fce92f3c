//! ufw default policies, allow rules and activation
//!
//! A missing `ufw` binary reads as "nothing configured" so a dry run on a
//! fresh host reports changes instead of failing; the package item earlier
//! in the plan installs it before any of these are applied.

use crate::config::{Policy, PortSpec, Protocol};
use convergence::{CommandOutput, DesiredItem, Host, ItemError, ItemState, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

const UFW_DEFAULTS: &str = "/etc/default/ufw";

static POLICY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(DEFAULT_INPUT_POLICY|DEFAULT_OUTPUT_POLICY)\s*=\s*"?([A-Z]+)"?"#)
        .expect("valid regex")
});

/// Run a ufw query, mapping a missing binary to `None`
fn query_ufw(host: &dyn Host, args: &[&str]) -> Result<Option<CommandOutput>> {
    match host.run("ufw", args) {
        Ok(output) => Ok(Some(output)),
        Err(ItemError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }

    fn defaults_key(self) -> &'static str {
        match self {
            Self::Incoming => "DEFAULT_INPUT_POLICY",
            Self::Outgoing => "DEFAULT_OUTPUT_POLICY",
        }
    }
}

/// Port number behind a service name, from `getent services <name>/<proto>`
///
/// `None` when the name is unknown or getent is unavailable.
fn resolve_service(host: &dyn Host, name: &str, protocol: Protocol) -> Result<Option<u16>> {
    let query = format!("{name}/{}", protocol.as_str());
    let output = match host.run("getent", &["services", &query]) {
        Ok(output) => output,
        Err(ItemError::NotFound { .. }) => return Ok(None),
        Err(err) => return Err(err),
    };
    if !output.success {
        return Ok(None);
    }
    Ok(output
        .stdout_str()
        .split_whitespace()
        .nth(1)
        .and_then(|port| port.split_once('/'))
        .and_then(|(port, _)| port.parse().ok()))
}

/// Whether a `ufw show added` line allows `spec`, with or without comment
fn allows(line: &str, spec: &str) -> bool {
    let wanted = format!("ufw allow {spec}");
    let line = line.trim();
    line == wanted
        || line
            .strip_prefix(&wanted)
            .is_some_and(|rest| rest.starts_with(" comment "))
}

/// Policy for one direction, read from /etc/default/ufw
pub fn read_default_policy(contents: &str, direction: Direction) -> Option<&'static str> {
    POLICY_LINE
        .captures_iter(contents)
        .filter(|c| &c[1] == direction.defaults_key())
        .last()
        .and_then(|c| match &c[2] {
            "DROP" => Some("deny"),
            "ACCEPT" => Some("allow"),
            "REJECT" => Some("reject"),
            _ => None,
        })
}

/// `ufw default <policy> <direction>`
#[derive(Debug, Clone)]
pub struct UfwDefault {
    direction: Direction,
    policy: Policy,
    defaults_file: PathBuf,
}

impl UfwDefault {
    pub fn new(direction: Direction, policy: Policy) -> Self {
        Self {
            direction,
            policy,
            defaults_file: PathBuf::from(UFW_DEFAULTS),
        }
    }
}

impl DesiredItem for UfwDefault {
    fn id(&self) -> String {
        format!("ufw:default {}", self.direction.as_str())
    }

    fn description(&self) -> String {
        format!(
            "Set default {} policy to {}",
            self.direction.as_str(),
            self.policy.as_str()
        )
    }

    fn item_type(&self) -> &'static str {
        "firewall"
    }

    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        let contents = host.read_file(&self.defaults_file)?;
        Ok(contents
            .as_deref()
            .and_then(|c| read_default_policy(c, self.direction))
            .map_or(ItemState::Absent, ItemState::value))
    }

    fn desired_state(&self) -> ItemState {
        ItemState::value(self.policy.as_str())
    }

    fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
        host.run_checked(
            "ufw",
            &["default", self.policy.as_str(), self.direction.as_str()],
        )?;
        Ok(())
    }
}

/// `ufw allow <port>/<proto>`; a range is one rule
#[derive(Debug, Clone)]
pub struct UfwRule {
    port: PortSpec,
    protocol: Protocol,
    comment: String,
}

impl UfwRule {
    pub fn allow(port: PortSpec, protocol: Protocol, comment: &str) -> Self {
        Self {
            port,
            protocol,
            comment: comment.trim().to_string(),
        }
    }

    fn spec(&self) -> String {
        format!("{}/{}", self.port, self.protocol.as_str())
    }

    /// Every form ufw may list this rule under
    ///
    /// ufw stores `ssh/tcp` as `22/tcp`, so a service name also matches its
    /// port number.
    fn listed_specs(&self, host: &dyn Host) -> Result<Vec<String>> {
        let mut specs = vec![self.spec()];
        if let PortSpec::Service(name) = &self.port
            && let Some(port) = resolve_service(host, name, self.protocol)?
        {
            specs.push(format!("{port}/{}", self.protocol.as_str()));
        }
        Ok(specs)
    }
}

impl DesiredItem for UfwRule {
    fn id(&self) -> String {
        format!("ufw:allow {}", self.spec())
    }

    fn description(&self) -> String {
        if self.comment.is_empty() {
            format!("Allow {}", self.spec())
        } else {
            format!("Allow {} ({})", self.spec(), self.comment)
        }
    }

    fn item_type(&self) -> &'static str {
        "firewall"
    }

    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        let Some(output) = query_ufw(host, &["show", "added"])? else {
            return Ok(ItemState::Absent);
        };
        if !output.success {
            return Err(convergence::command_error("ufw", &["show", "added"], &output));
        }
        let specs = self.listed_specs(host)?;
        let present = output
            .stdout_str()
            .lines()
            .any(|l| specs.iter().any(|spec| allows(l, spec)));
        Ok(if present {
            ItemState::value("allowed")
        } else {
            ItemState::Absent
        })
    }

    fn desired_state(&self) -> ItemState {
        ItemState::value("allowed")
    }

    fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
        let spec = self.spec();
        let mut args = vec!["allow", spec.as_str()];
        if !self.comment.is_empty() {
            args.extend(["comment", self.comment.as_str()]);
        }
        host.run_checked("ufw", &args)?;
        Ok(())
    }
}

/// The firewall is active and starts on boot
#[derive(Debug, Clone, Default)]
pub struct UfwEnabled;

impl DesiredItem for UfwEnabled {
    fn id(&self) -> String {
        "ufw:enabled".to_string()
    }

    fn description(&self) -> String {
        "Enable ufw".to_string()
    }

    fn item_type(&self) -> &'static str {
        "firewall"
    }

    fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
        let Some(output) = query_ufw(host, &["status"])? else {
            return Ok(ItemState::Absent);
        };
        if !output.success {
            return Err(convergence::command_error("ufw", &["status"], &output));
        }
        let active = output
            .stdout_str()
            .lines()
            .any(|l| l.trim() == "Status: active");
        Ok(ItemState::value(if active { "active" } else { "inactive" }))
    }

    fn desired_state(&self) -> ItemState {
        ItemState::value("active")
    }

    fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
        host.run_checked("ufw", &["--force", "enable"])?;
        Ok(())
    }
}
