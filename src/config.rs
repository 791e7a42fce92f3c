//! Hardening configuration
//!
//! Loaded once from JSON, validated, then borrowed read-only by every step.
//! Every field has a default, so an empty object (or no file at all) is a
//! complete configuration.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static SERVICE_NAME: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[a-z][a-z0-9-]*$").expect("valid regex"));

static SYSCTL_KEY: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)+$").expect("valid regex")
});

/// Errors that stop a run before any step starts
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("could not read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for this schema
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A user entry has no name
    #[error("users[{index}] has an empty username")]
    EmptyUsername {
        /// Position in the `users` list
        index: usize,
    },

    /// Two user entries share a name
    #[error("user '{username}' is defined more than once")]
    DuplicateUser { username: String },

    /// `ssh_allowed_users` names someone not in `users`
    #[error("ssh_allowed_users contains '{username}', which is not defined in users")]
    UnknownSshUser { username: String },

    /// A firewall rule's port is not a port, range or service name
    #[error("firewall rule set '{rule_set}': invalid port '{port}': {reason}")]
    InvalidPort {
        rule_set: String,
        port: String,
        reason: String,
    },

    /// A sysctl key is not a dotted identifier
    #[error("invalid sysctl key '{key}'")]
    InvalidSysctlKey { key: String },

    /// A sysctl value is empty, multi-line or not a scalar
    #[error("invalid value for sysctl key '{key}': {reason}")]
    InvalidSysctlValue { key: String, reason: String },
}

// ============================================================================
// Top-level config
// ============================================================================

/// The whole hardening configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timezone: String,
    pub enable_ntp: bool,
    pub enable_unattended_upgrades: bool,
    /// Copy files aside before changing them
    pub backup_configs: bool,
    /// OR-ed with `--dry-run`
    pub dry_run: bool,

    pub step1: OsSteps,
    pub step2: UserSshSteps,
    pub step3: FirewallSteps,
    pub step4: SysctlSteps,
    pub step5: AuditSteps,

    pub users: Vec<User>,
    pub ssh_allowed_users: Vec<String>,
    /// sshd settings that override the built-in ones
    #[serde(deserialize_with = "scalar_map")]
    pub ssh: BTreeMap<String, String>,

    pub firewall: FirewallSpec,
    pub sysctl: SysctlSpec,
    /// Replaces the built-in auditd.conf settings when present
    #[serde(deserialize_with = "optional_scalar_map")]
    pub auditd: Option<BTreeMap<String, String>>,
    /// Replaces the built-in audit rules when present
    pub audit_rules: Option<Vec<String>>,
    pub disable_services: BTreeSet<String>,

    pub cis_profile: Option<String>,
    pub organization: Option<String>,
    pub compliance_requirements: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            enable_ntp: true,
            enable_unattended_upgrades: true,
            backup_configs: true,
            dry_run: false,
            step1: OsSteps::default(),
            step2: UserSshSteps::default(),
            step3: FirewallSteps::default(),
            step4: SysctlSteps::default(),
            step5: AuditSteps::default(),
            users: Vec::new(),
            ssh_allowed_users: Vec::new(),
            ssh: BTreeMap::new(),
            firewall: FirewallSpec::default(),
            sysctl: SysctlSpec::default(),
            auditd: None,
            audit_rules: None,
            disable_services: ["avahi-daemon", "cups", "bluetooth"]
                .into_iter()
                .map(String::from)
                .collect(),
            cis_profile: None,
            organization: None,
            compliance_requirements: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate a config file
    ///
    /// `~` is expanded. Legacy flat sysctl keys are migrated with a warning.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
        let content = std::fs::read_to_string(&expanded).map_err(|source| ConfigError::Read {
            path: expanded.clone(),
            source,
        })?;
        let config = Self::from_json(&content, &expanded)?;
        log::info!("Loaded configuration from {}", expanded.display());
        Ok(config)
    }

    /// Parse and validate config text; `path` is only used in errors
    pub fn from_json(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: Self =
            serde_json::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.sysctl.migrate_legacy()?;
        config.validate()?;
        if !config.step4.verify_sysctl || !config.step5.verify_configuration {
            log::warn!("Verification cannot be switched off; every change is re-read after it is made");
        }
        Ok(config)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for (index, user) in self.users.iter().enumerate() {
            if user.username.trim().is_empty() {
                return Err(ConfigError::EmptyUsername { index });
            }
            if !seen.insert(user.username.as_str()) {
                return Err(ConfigError::DuplicateUser {
                    username: user.username.clone(),
                });
            }
        }

        if let Some(unknown) = self
            .ssh_allowed_users
            .iter()
            .find(|name| !seen.contains(name.as_str()))
        {
            return Err(ConfigError::UnknownSshUser {
                username: unknown.clone(),
            });
        }

        for (rule_set, rules) in &self.firewall.rule_sets {
            for rule in rules {
                PortSpec::parse(&rule.port).map_err(|reason| ConfigError::InvalidPort {
                    rule_set: rule_set.clone(),
                    port: rule.port.clone(),
                    reason,
                })?;
            }
        }

        for (key, value) in &self.sysctl.parameters {
            validate_sysctl(key, value)?;
        }

        if self.firewall.default_incoming != Policy::Allow && !self.firewall.allows_ssh() {
            log::warn!(
                "Firewall denies incoming traffic and no rule allows SSH; remote access may be lost"
            );
        }

        Ok(())
    }

    /// Whether any configured user has a password
    pub fn any_user_has_password(&self) -> bool {
        self.users.iter().any(|u| u.password.is_some())
    }

    /// Profile metadata copied into every step result
    pub fn metadata(&self) -> Value {
        serde_json::json!({
            "cis_profile": self.cis_profile,
            "organization": self.organization,
            "compliance_requirements": self.compliance_requirements,
        })
    }
}

fn validate_sysctl(key: &str, value: &str) -> Result<(), ConfigError> {
    if !SYSCTL_KEY.is_match(key) {
        return Err(ConfigError::InvalidSysctlKey {
            key: key.to_string(),
        });
    }
    let reason = if value.trim().is_empty() {
        "value is empty"
    } else if value.contains('\n') {
        "value spans multiple lines"
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidSysctlValue {
        key: key.to_string(),
        reason: reason.to_string(),
    })
}

// ============================================================================
// Per-step switches
// ============================================================================
//
// Unknown switches are rejected: a misspelled `false` would otherwise be
// dropped and the task would run.

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OsSteps {
    pub update_system: bool,
    pub unattended_upgrades: bool,
    pub timezone_ntp: bool,
}

impl Default for OsSteps {
    fn default() -> Self {
        Self {
            update_system: true,
            unattended_upgrades: true,
            timezone_ntp: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UserSshSteps {
    pub create_users: bool,
    pub configure_ssh: bool,
}

impl Default for UserSshSteps {
    fn default() -> Self {
        Self {
            create_users: true,
            configure_ssh: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FirewallSteps {
    pub configure_firewall: bool,
    pub disable_services: bool,
}

impl Default for FirewallSteps {
    fn default() -> Self {
        Self {
            configure_firewall: true,
            disable_services: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SysctlSteps {
    /// Manage kernel parameters at all
    pub configure_sysctl: bool,
    /// Set parameters on the running kernel; off means persist only
    pub apply_sysctl: bool,
    /// Every change is re-read; `false` is accepted and ignored
    pub verify_sysctl: bool,
    pub load_bridge_module: bool,
}

impl Default for SysctlSteps {
    fn default() -> Self {
        Self {
            configure_sysctl: true,
            apply_sysctl: true,
            verify_sysctl: true,
            load_bridge_module: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSteps {
    pub install_auditd: bool,
    pub configure_auditd: bool,
    #[serde(alias = "configure_audit_rules")]
    pub audit_rules: bool,
    #[serde(alias = "configure_rsyslog")]
    pub rsyslog: bool,
    pub enable_auditd: bool,
    /// Restart rsyslog after its drop-in changes
    pub restart_rsyslog: bool,
    /// Every change is re-read; `false` is accepted and ignored
    pub verify_configuration: bool,
}

impl Default for AuditSteps {
    fn default() -> Self {
        Self {
            install_auditd: true,
            configure_auditd: true,
            audit_rules: true,
            rsyslog: true,
            enable_auditd: true,
            restart_rsyslog: true,
            verify_configuration: true,
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// An account to ensure exists
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub groups: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    #[serde(default)]
    pub password: Option<Secret>,
}

/// A string that never shows up in logs or results
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

// ============================================================================
// Firewall
// ============================================================================

/// ufw default policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Allow,
    Deny,
    Reject,
}

impl Policy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// One allow rule
#[derive(Debug, Clone, Deserialize)]
pub struct PortRule {
    /// `22`, `"ssh"` or `"2379:2380"`
    #[serde(deserialize_with = "scalar")]
    pub port: String,
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    #[serde(default)]
    pub description: String,
}

fn default_protocol() -> Protocol {
    Protocol::Tcp
}

impl PortRule {
    fn new(port: &str, protocol: Protocol, description: &str) -> Self {
        Self {
            port: port.to_string(),
            protocol,
            description: description.to_string(),
        }
    }
}

/// A validated port specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    Single(u16),
    /// Inclusive range, start < end
    Range(u16, u16),
    Service(String),
}

impl PortSpec {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if let Some((start, end)) = raw.split_once(':') {
            let start = parse_port(start)?;
            let end = parse_port(end)?;
            if start >= end {
                return Err(format!("range start {start} must be below end {end}"));
            }
            return Ok(Self::Range(start, end));
        }
        if raw.chars().all(|c| c.is_ascii_digit()) && !raw.is_empty() {
            return parse_port(raw).map(Self::Single);
        }
        if SERVICE_NAME.is_match(raw) {
            return Ok(Self::Service(raw.to_string()));
        }
        Err("expected a port, a start:end range or a service name".to_string())
    }

    /// Whether this spec covers the SSH port
    pub fn covers_ssh(&self) -> bool {
        match self {
            Self::Single(p) => *p == 22,
            Self::Range(start, end) => (*start..=*end).contains(&22),
            Self::Service(name) => name == "ssh",
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(p) => write!(f, "{p}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::Service(name) => f.write_str(name),
        }
    }
}

fn parse_port(raw: &str) -> Result<u16, String> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("'{raw}' is not a port between 1 and 65535")),
        Ok(port) => Ok(port),
    }
}

/// Firewall policy and named rule sets
///
/// Any key other than the two policies is a rule set, e.g.
/// `"essential_ports": [{"port": "ssh", "protocol": "tcp"}]`.
#[derive(Debug, Clone, Deserialize)]
pub struct FirewallSpec {
    #[serde(default = "default_incoming")]
    pub default_incoming: Policy,
    #[serde(default = "default_outgoing")]
    pub default_outgoing: Policy,
    #[serde(flatten)]
    pub rule_sets: BTreeMap<String, Vec<PortRule>>,
}

fn default_incoming() -> Policy {
    Policy::Deny
}

fn default_outgoing() -> Policy {
    Policy::Allow
}

impl Default for FirewallSpec {
    fn default() -> Self {
        let essential = vec![
            PortRule::new("ssh", Protocol::Tcp, "SSH"),
            PortRule::new("ntp", Protocol::Udp, "NTP"),
        ];
        Self {
            default_incoming: default_incoming(),
            default_outgoing: default_outgoing(),
            rule_sets: BTreeMap::from([("essential_ports".to_string(), essential)]),
        }
    }
}

impl FirewallSpec {
    /// Every rule, in rule-set order
    pub fn rules(&self) -> impl Iterator<Item = (&str, &PortRule)> {
        self.rule_sets
            .iter()
            .flat_map(|(set, rules)| rules.iter().map(move |r| (set.as_str(), r)))
    }

    fn allows_ssh(&self) -> bool {
        self.rules().any(|(_, rule)| {
            rule.protocol == Protocol::Tcp
                && PortSpec::parse(&rule.port).is_ok_and(|spec| spec.covers_ssh())
        })
    }
}

// ============================================================================
// Sysctl
// ============================================================================

/// Kernel parameters
///
/// The canonical shape is `{"parameters": {...}, "include_defaults": true}`.
/// Older configs put keys directly under `sysctl`; those are collected in
/// `legacy` and moved into `parameters` at load.
#[derive(Debug, Clone, Deserialize)]
pub struct SysctlSpec {
    #[serde(default, deserialize_with = "scalar_map")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub include_defaults: bool,
    #[serde(flatten)]
    legacy: BTreeMap<String, Value>,
}

impl Default for SysctlSpec {
    fn default() -> Self {
        Self {
            parameters: BTreeMap::new(),
            include_defaults: true,
            legacy: BTreeMap::new(),
        }
    }
}

impl SysctlSpec {
    fn migrate_legacy(&mut self) -> Result<(), ConfigError> {
        if self.legacy.is_empty() {
            return Ok(());
        }
        log::warn!(
            "sysctl keys outside \"parameters\" are deprecated; migrating {} key(s)",
            self.legacy.len()
        );
        for (key, value) in std::mem::take(&mut self.legacy) {
            let value = scalar_to_string(&value).ok_or_else(|| ConfigError::InvalidSysctlValue {
                key: key.clone(),
                reason: "expected a string or number".to_string(),
            })?;
            self.parameters.entry(key).or_insert(value);
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Scalar helpers
// ============================================================================

/// Accept strings, numbers and booleans where the tool only needs text
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    scalar_to_string(&value)
        .ok_or_else(|| serde::de::Error::custom("expected a string or number"))
}

fn scalar_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| match scalar_to_string(&value) {
            Some(text) => Ok((key, text)),
            None => Err(serde::de::Error::custom(format!(
                "'{key}': expected a string or number"
            ))),
        })
        .collect()
}

fn optional_scalar_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, String>>, D::Error> {
    scalar_map(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Config, ConfigError> {
        Config::from_json(json, Path::new("test.json"))
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = parse("{}").unwrap();
        assert_eq!(config.timezone, "UTC");
        assert!(config.backup_configs);
        assert!(!config.dry_run);
        assert!(config.step4.load_bridge_module);
        assert!(config.sysctl.include_defaults);
        assert!(config.disable_services.contains("cups"));
        assert_eq!(config.firewall.default_incoming, Policy::Deny);
        assert_eq!(config.firewall.rules().count(), 2);
    }

    #[test]
    fn test_unknown_ssh_user_is_rejected() {
        let err = parse(
            r#"{"users": [{"username": "deploy", "groups": ["sudo"]}],
                "ssh_allowed_users": ["deploy", "mallory"]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSshUser { ref username } if username == "mallory"));
    }

    #[test]
    fn test_duplicate_and_empty_users_are_rejected() {
        let dup = parse(r#"{"users": [{"username": "a"}, {"username": "a"}]}"#).unwrap_err();
        assert!(matches!(dup, ConfigError::DuplicateUser { .. }));

        let empty = parse(r#"{"users": [{"username": "a"}, {"username": " "}]}"#).unwrap_err();
        assert!(matches!(empty, ConfigError::EmptyUsername { index: 1 }));
    }

    #[test]
    fn test_port_specs() {
        assert_eq!(PortSpec::parse("22"), Ok(PortSpec::Single(22)));
        assert_eq!(PortSpec::parse("2379:2380"), Ok(PortSpec::Range(2379, 2380)));
        assert_eq!(PortSpec::parse("ssh"), Ok(PortSpec::Service("ssh".into())));
        assert!(PortSpec::parse("0").is_err());
        assert!(PortSpec::parse("70000").is_err());
        assert!(PortSpec::parse("2380:2379").is_err());
        assert!(PortSpec::parse("Bad Name").is_err());
        assert_eq!(PortSpec::Range(2379, 2380).to_string(), "2379:2380");
    }

    #[test]
    fn test_firewall_rule_sets_and_invalid_port() {
        let config = parse(
            r#"{"firewall": {
                "default_incoming": "deny",
                "essential_ports": [{"port": 22, "protocol": "tcp", "description": "SSH"}],
                "k3s_ports": [{"port": "2379:2380", "protocol": "tcp", "description": "etcd"}]
            }}"#,
        )
        .unwrap();
        let rules: Vec<_> = config.firewall.rules().map(|(set, r)| (set, r.port.as_str())).collect();
        assert_eq!(rules, vec![("essential_ports", "22"), ("k3s_ports", "2379:2380")]);

        let err = parse(r#"{"firewall": {"extra": [{"port": "1:0", "protocol": "udp"}]}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { ref rule_set, .. } if rule_set == "extra"));
    }

    #[test]
    fn test_legacy_sysctl_keys_are_migrated() {
        let config = parse(
            r#"{"sysctl": {"net.ipv4.ip_forward": 0, "parameters": {"kernel.kptr_restrict": "2"}}}"#,
        )
        .unwrap();
        assert_eq!(config.sysctl.parameters["net.ipv4.ip_forward"], "0");
        assert_eq!(config.sysctl.parameters["kernel.kptr_restrict"], "2");
    }

    #[test]
    fn test_invalid_sysctl_entries() {
        let key = parse(r#"{"sysctl": {"parameters": {"nodots": "1"}}}"#).unwrap_err();
        assert!(matches!(key, ConfigError::InvalidSysctlKey { .. }));

        let value = parse(r#"{"sysctl": {"net.ipv4.ip_forward": [1]}}"#).unwrap_err();
        assert!(matches!(value, ConfigError::InvalidSysctlValue { .. }));
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        assert!(matches!(parse("{ nope"), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            Config::load("/nonexistent/hardn.json"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_step_switch_names_from_older_configs() {
        let config = parse(
            r#"{"step4": {"configure_sysctl": true, "apply_sysctl": false, "verify_sysctl": true},
                "step5": {"install_auditd": true, "configure_auditd": true,
                          "configure_audit_rules": false, "configure_rsyslog": false,
                          "enable_auditd": false, "restart_rsyslog": false,
                          "verify_configuration": true}}"#,
        )
        .unwrap();
        assert!(!config.step4.apply_sysctl);
        assert!(!config.step5.audit_rules);
        assert!(!config.step5.rsyslog);
        assert!(!config.step5.enable_auditd);
        assert!(!config.step5.restart_rsyslog);
        assert!(config.step5.install_auditd);
    }

    #[test]
    fn test_unknown_step_switch_is_rejected() {
        let err = parse(r#"{"step5": {"configure_rsylog": false}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("configure_rsylog"));
    }

    #[test]
    fn test_password_is_redacted() {
        let config = parse(
            r#"{"users": [{"username": "ops", "password": "hunter2"}], "ssh_allowed_users": ["ops"]}"#,
        )
        .unwrap();
        assert!(config.any_user_has_password());
        let shown = format!("{:?}", config.users[0]);
        assert!(!shown.contains("hunter2"));
        assert_eq!(config.users[0].password.as_ref().map(Secret::expose), Some("hunter2"));
    }
}
