//! Simulated Ubuntu host for unit tests
//!
//! Models just enough of sysctl, dpkg/apt, systemctl, timedatectl, the
//! account tools, ufw and modprobe for items to read back what they wrote.

use convergence::{CommandOutput, Host, ItemError, Result};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const UFW_DEFAULTS: &str = "/etc/default/ufw";

/// Packages whose postinst enables and starts a unit of the same name
const PACKAGE_UNITS: &[&str] = &["auditd", "ufw", "unattended-upgrades"];

/// The slice of /etc/services the firewall tests use
const SERVICES: &[(&str, &str)] = &[
    ("ssh", "22/tcp"),
    ("http", "80/tcp"),
    ("https", "443/tcp"),
    ("ntp", "123/udp"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct State {
    files: BTreeMap<PathBuf, String>,
    sysctl: BTreeMap<String, String>,
    packages: BTreeSet<String>,
    pending_upgrades: usize,
    services: BTreeMap<String, String>,
    running: BTreeSet<String>,
    users: BTreeMap<String, BTreeSet<String>>,
    passwords: BTreeMap<String, String>,
    ufw_rules: Vec<String>,
    ufw_active: bool,
    timezone: String,
    ntp: bool,
}

pub struct FakeHost {
    state: RefCell<State>,
    commands: RefCell<Vec<String>>,
    failing: RefCell<Vec<String>>,
    sticky_sysctl: RefCell<BTreeSet<String>>,
    mutations: Cell<usize>,
    privileged: bool,
}

impl Default for FakeHost {
    fn default() -> Self {
        let mut state = State {
            timezone: "Etc/UTC".to_string(),
            ..State::default()
        };
        state.files.insert(
            UFW_DEFAULTS.into(),
            "IPV6=yes\nDEFAULT_INPUT_POLICY=\"ACCEPT\"\nDEFAULT_OUTPUT_POLICY=\"ACCEPT\"\n"
                .to_string(),
        );
        state.files.insert("/proc/modules".into(), String::new());
        Self {
            state: RefCell::new(state),
            commands: RefCell::default(),
            failing: RefCell::default(),
            sticky_sysctl: RefCell::default(),
            mutations: Cell::new(0),
            privileged: true,
        }
    }
}

impl FakeHost {
    pub fn unprivileged() -> Self {
        Self {
            privileged: false,
            ..Self::default()
        }
    }

    // -- setup ---------------------------------------------------------------

    pub fn put_file(&self, path: impl AsRef<Path>, contents: &str) {
        self.state
            .borrow_mut()
            .files
            .insert(path.as_ref().to_path_buf(), contents.to_string());
    }

    pub fn set_sysctl(&self, key: &str, value: &str) {
        self.state
            .borrow_mut()
            .sysctl
            .insert(key.to_string(), value.to_string());
    }

    /// `sysctl -w` succeeds for `key` but the value never changes
    pub fn make_sysctl_sticky(&self, key: &str) {
        self.sticky_sysctl.borrow_mut().insert(key.to_string());
    }

    pub fn install_package(&self, name: &str) {
        self.state.borrow_mut().packages.insert(name.to_string());
    }

    pub fn set_pending_upgrades(&self, count: usize) {
        self.state.borrow_mut().pending_upgrades = count;
    }

    /// Set the unit file state; "enabled" units are also started
    pub fn set_service(&self, name: &str, state: &str) {
        let mut host = self.state.borrow_mut();
        host.services.insert(name.to_string(), state.to_string());
        if state == "enabled" {
            host.running.insert(name.to_string());
        } else {
            host.running.remove(name);
        }
    }

    pub fn set_running(&self, name: &str, running: bool) {
        let mut host = self.state.borrow_mut();
        if running {
            host.running.insert(name.to_string());
        } else {
            host.running.remove(name);
        }
    }

    pub fn add_user(&self, name: &str, groups: &[&str]) {
        let mut all: BTreeSet<String> = groups.iter().map(ToString::to_string).collect();
        all.insert(name.to_string());
        self.state.borrow_mut().users.insert(name.to_string(), all);
    }

    /// Commands whose command line starts with `prefix` exit 1
    pub fn fail_on(&self, prefix: &str) {
        self.failing.borrow_mut().push(prefix.to_string());
    }

    // -- inspection ----------------------------------------------------------

    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state.borrow().files.get(path.as_ref()).cloned()
    }

    pub fn files_under(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        self.state
            .borrow()
            .files
            .keys()
            .filter(|p| p.starts_with(root.as_ref()))
            .cloned()
            .collect()
    }

    pub fn sysctl(&self, key: &str) -> Option<String> {
        self.state.borrow().sysctl.get(key).cloned()
    }

    pub fn service(&self, name: &str) -> Option<String> {
        self.state.borrow().services.get(name).cloned()
    }

    pub fn service_running(&self, name: &str) -> bool {
        self.state.borrow().running.contains(name)
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.state.borrow().packages.contains(name)
    }

    pub fn user_groups(&self, name: &str) -> Option<BTreeSet<String>> {
        self.state.borrow().users.get(name).cloned()
    }

    pub fn password(&self, name: &str) -> Option<String> {
        self.state.borrow().passwords.get(name).cloned()
    }

    pub fn ufw_rules(&self) -> Vec<String> {
        self.state.borrow().ufw_rules.clone()
    }

    pub fn ufw_active(&self) -> bool {
        self.state.borrow().ufw_active
    }

    pub fn timezone(&self) -> String {
        self.state.borrow().timezone.clone()
    }

    /// Opaque fingerprint of everything the host holds
    pub fn snapshot(&self) -> String {
        format!("{:?}", self.state.borrow())
    }

    /// Number of writes and state-changing commands so far
    pub fn mutations(&self) -> usize {
        self.mutations.get()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    pub fn ran(&self, command_line: &str) -> bool {
        self.commands.borrow().iter().any(|c| c == command_line)
    }

    // -- simulation ----------------------------------------------------------

    fn mutate(&self) {
        self.mutations.set(self.mutations.get() + 1);
    }

    fn simulate(&self, cmd: &str, args: &[&str], input: &str) -> Result<CommandOutput> {
        match cmd {
            "sysctl" => Ok(self.sysctl_cmd(args)),
            "dpkg-query" => Ok(self.dpkg_query(args)),
            "apt-get" => Ok(self.apt_get(args)),
            "systemctl" => Ok(self.systemctl(args)),
            "timedatectl" => Ok(self.timedatectl(args)),
            "id" => Ok(self.id(args)),
            "adduser" => Ok(self.adduser(args)),
            "usermod" => Ok(self.usermod(args)),
            "chpasswd" => Ok(self.chpasswd(input)),
            "ufw" => Ok(self.ufw(args)),
            "modprobe" => Ok(self.modprobe(args)),
            "getent" => Ok(Self::getent(args)),
            "chown" | "chmod" | "sshd" | "augenrules" => {
                if cmd != "sshd" {
                    self.mutate();
                }
                Ok(CommandOutput::ok(""))
            }
            other => Err(ItemError::NotFound {
                what: other.to_string(),
            }),
        }
    }

    fn sysctl_cmd(&self, args: &[&str]) -> CommandOutput {
        match args {
            ["-n", key] => match self.sysctl(key) {
                Some(value) => CommandOutput::ok(format!("{value}\n")),
                None => CommandOutput::failed(
                    255,
                    format!("sysctl: cannot stat /proc/sys/{}: No such file or directory", key.replace('.', "/")),
                ),
            },
            ["-w", assignment] => {
                let Some((key, value)) = assignment.split_once('=') else {
                    return CommandOutput::failed(255, "sysctl: malformed setting");
                };
                self.mutate();
                if !self.sticky_sysctl.borrow().contains(key) {
                    self.set_sysctl(key, value);
                }
                CommandOutput::ok(format!("{key} = {value}\n"))
            }
            _ => CommandOutput::failed(255, "sysctl: unsupported"),
        }
    }

    fn dpkg_query(&self, args: &[&str]) -> CommandOutput {
        match args.last() {
            Some(pkg) if self.has_package(pkg) => CommandOutput::ok("install ok installed"),
            Some(pkg) => {
                CommandOutput::failed(1, format!("dpkg-query: no packages found matching {pkg}"))
            }
            None => CommandOutput::failed(2, "dpkg-query: need a package name"),
        }
    }

    fn apt_get(&self, args: &[&str]) -> CommandOutput {
        match args {
            ["update"] => CommandOutput::ok("Reading package lists... Done\n"),
            ["-s", "upgrade"] => {
                let pending = self.state.borrow().pending_upgrades;
                let listing: String = (0..pending)
                    .map(|i| format!("Inst pkg{i} [1.0] (1.1 Ubuntu:22.04/jammy-updates [amd64])\n"))
                    .collect();
                CommandOutput::ok(listing)
            }
            ["-y", "upgrade"] => {
                self.mutate();
                self.state.borrow_mut().pending_upgrades = 0;
                CommandOutput::ok("")
            }
            ["install", "-y", packages @ ..] => {
                self.mutate();
                for pkg in packages {
                    self.install_package(pkg);
                    if PACKAGE_UNITS.contains(pkg) && self.service(pkg).is_none() {
                        self.set_service(pkg, "enabled");
                    }
                }
                CommandOutput::ok("")
            }
            _ => CommandOutput::failed(100, "E: Invalid operation"),
        }
    }

    fn systemctl(&self, args: &[&str]) -> CommandOutput {
        match args {
            ["is-enabled", name] => match self.service(name) {
                Some(state) => {
                    let enabled = matches!(state.as_str(), "enabled" | "static" | "alias");
                    CommandOutput {
                        stdout: format!("{state}\n").into_bytes(),
                        stderr: Vec::new(),
                        success: enabled,
                        code: Some(i32::from(!enabled)),
                    }
                }
                None => CommandOutput::failed(
                    1,
                    format!("Failed to get unit file state for {name}.service: No such file or directory"),
                ),
            },
            ["is-active", name] => {
                let running = self.service_running(name);
                CommandOutput {
                    stdout: (if running { "active\n" } else { "inactive\n" }).as_bytes().to_vec(),
                    stderr: Vec::new(),
                    success: running,
                    code: Some(if running { 0 } else { 3 }),
                }
            }
            [verb @ ("enable" | "disable"), "--now", name] => {
                if self.service(name).is_none() {
                    return CommandOutput::failed(1, format!("Unit file {name}.service does not exist."));
                }
                self.mutate();
                let enable = *verb == "enable";
                self.set_service(name, if enable { "enabled" } else { "disabled" });
                self.set_running(name, enable);
                CommandOutput::ok("")
            }
            ["restart", _] | ["kill", "--signal=SIGHUP", _] => {
                self.mutate();
                CommandOutput::ok("")
            }
            _ => CommandOutput::failed(1, "systemctl: unsupported"),
        }
    }

    fn timedatectl(&self, args: &[&str]) -> CommandOutput {
        match args {
            ["show", "-p", "Timezone", "--value"] => CommandOutput::ok(format!("{}\n", self.timezone())),
            ["show", "-p", "NTP", "--value"] => {
                let ntp = if self.state.borrow().ntp { "yes" } else { "no" };
                CommandOutput::ok(format!("{ntp}\n"))
            }
            ["set-timezone", tz] => {
                self.mutate();
                self.state.borrow_mut().timezone = (*tz).to_string();
                CommandOutput::ok("")
            }
            ["set-ntp", value] => {
                self.mutate();
                self.state.borrow_mut().ntp = *value == "true";
                CommandOutput::ok("")
            }
            _ => CommandOutput::failed(1, "timedatectl: unsupported"),
        }
    }

    fn id(&self, args: &[&str]) -> CommandOutput {
        let Some(name) = args.last() else {
            return CommandOutput::failed(1, "id: missing user");
        };
        match self.user_groups(name) {
            Some(groups) => {
                // Primary group first, as `id -nG` prints it
                let mut listed = vec![(*name).to_string()];
                listed.extend(groups.into_iter().filter(|g| g.as_str() != *name));
                CommandOutput::ok(format!("{}\n", listed.join(" ")))
            }
            None => CommandOutput::failed(1, format!("id: '{name}': no such user")),
        }
    }

    fn adduser(&self, args: &[&str]) -> CommandOutput {
        let Some(name) = args.last() else {
            return CommandOutput::failed(1, "adduser: missing user");
        };
        if self.user_groups(name).is_some() {
            return CommandOutput::failed(1, format!("adduser: The user `{name}' already exists."));
        }
        self.mutate();
        self.add_user(name, &[]);
        CommandOutput::ok("")
    }

    fn usermod(&self, args: &[&str]) -> CommandOutput {
        let ["-aG", groups, name] = args else {
            return CommandOutput::failed(2, "usermod: unsupported");
        };
        let mut state = self.state.borrow_mut();
        let Some(current) = state.users.get_mut(*name) else {
            return CommandOutput::failed(6, format!("usermod: user '{name}' does not exist"));
        };
        current.extend(groups.split(',').map(ToString::to_string));
        drop(state);
        self.mutate();
        CommandOutput::ok("")
    }

    fn chpasswd(&self, input: &str) -> CommandOutput {
        self.mutate();
        for line in input.lines() {
            if let Some((user, pass)) = line.split_once(':') {
                self.state
                    .borrow_mut()
                    .passwords
                    .insert(user.to_string(), pass.to_string());
            }
        }
        CommandOutput::ok("")
    }

    fn ufw(&self, args: &[&str]) -> CommandOutput {
        match args {
            ["show", "added"] => {
                let rules = self.ufw_rules();
                let mut out = String::from("Added user rules (see 'ufw status' for running firewall):\n");
                if rules.is_empty() {
                    out.push_str("(None)\n");
                }
                for rule in rules {
                    out.push_str(&rule);
                    out.push('\n');
                }
                CommandOutput::ok(out)
            }
            ["allow", spec, rest @ ..] => {
                self.mutate();
                let mut line = format!("ufw allow {}", Self::resolve_service(spec));
                if let ["comment", comment] = rest {
                    line.push_str(&format!(" comment '{comment}'"));
                }
                let mut state = self.state.borrow_mut();
                if !state.ufw_rules.contains(&line) {
                    state.ufw_rules.push(line);
                }
                CommandOutput::ok("Rule added\n")
            }
            ["default", policy, direction] => {
                self.mutate();
                let key = if *direction == "incoming" {
                    "DEFAULT_INPUT_POLICY"
                } else {
                    "DEFAULT_OUTPUT_POLICY"
                };
                let value = match *policy {
                    "allow" => "ACCEPT",
                    "reject" => "REJECT",
                    _ => "DROP",
                };
                let current = self.file(UFW_DEFAULTS).unwrap_or_default();
                let updated: Vec<String> = current
                    .lines()
                    .map(|l| {
                        if l.starts_with(key) {
                            format!("{key}=\"{value}\"")
                        } else {
                            l.to_string()
                        }
                    })
                    .collect();
                self.put_file(UFW_DEFAULTS, &format!("{}\n", updated.join("\n")));
                CommandOutput::ok("")
            }
            ["status"] => {
                let status = if self.ufw_active() { "active" } else { "inactive" };
                CommandOutput::ok(format!("Status: {status}\n"))
            }
            ["--force", "enable"] => {
                self.mutate();
                self.state.borrow_mut().ufw_active = true;
                CommandOutput::ok("Firewall is active and enabled on system startup\n")
            }
            _ => CommandOutput::failed(1, "ERROR: Invalid syntax"),
        }
    }

    /// ufw lists `name/proto` rules by port number
    fn resolve_service(spec: &str) -> String {
        SERVICES
            .iter()
            .find(|(name, port)| {
                spec.split_once('/').is_some_and(|(n, proto)| {
                    n == *name && port.ends_with(&format!("/{proto}"))
                })
            })
            .map_or_else(|| spec.to_string(), |(_, port)| (*port).to_string())
    }

    fn getent(args: &[&str]) -> CommandOutput {
        let ["services", query] = args else {
            return CommandOutput::failed(1, "getent: unsupported");
        };
        let (name, proto) = query.split_once('/').unwrap_or((*query, ""));
        SERVICES
            .iter()
            .find(|(n, port)| *n == name && (proto.is_empty() || port.ends_with(&format!("/{proto}"))))
            .map_or_else(
                || CommandOutput::failed(2, ""),
                |(n, port)| CommandOutput::ok(format!("{n:<22}{port}\n")),
            )
    }

    fn modprobe(&self, args: &[&str]) -> CommandOutput {
        let Some(module) = args.last() else {
            return CommandOutput::failed(1, "modprobe: missing module");
        };
        self.mutate();
        let mut modules = self.file("/proc/modules").unwrap_or_default();
        modules.push_str(&format!("{module} 32768 0 - Live 0x0000000000000000\n"));
        self.put_file("/proc/modules", &modules);
        CommandOutput::ok("")
    }
}

impl Host for FakeHost {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        self.run_with_input(cmd, args, "")
    }

    fn run_with_input(&self, cmd: &str, args: &[&str], input: &str) -> Result<CommandOutput> {
        let mut line = vec![cmd];
        line.extend_from_slice(args);
        let line = line.join(" ");
        self.commands.borrow_mut().push(line.clone());

        if self.failing.borrow().iter().any(|p| line.starts_with(p)) {
            return Ok(CommandOutput::failed(1, format!("{cmd}: simulated failure")));
        }
        self.simulate(cmd, args, input)
    }

    fn read_file(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.file(path))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.mutate();
        self.put_file(path, contents);
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        let contents = self.file(from).ok_or_else(|| ItemError::NotFound {
            what: from.display().to_string(),
        })?;
        self.write_file(to, &contents)
    }

    fn is_privileged(&self) -> bool {
        self.privileged
    }
}
