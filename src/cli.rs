use crate::steps::StepId;
use clap::{ArgGroup, Parser, ValueEnum};
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hardn")]
#[command(version)]
#[command(about = "Convergent CIS hardening for Ubuntu servers", long_about = None)]
#[command(group(
    ArgGroup::new("steps")
        .required(true)
        .multiple(true)
        .args(["step1", "step2", "step3", "step4", "step5", "all"])
))]
pub struct Cli {
    /// Step 1: system updates, unattended upgrades, timezone and NTP
    #[arg(long)]
    pub step1: bool,

    /// Step 2: local users, SSH keys and sshd settings
    #[arg(long)]
    pub step2: bool,

    /// Step 3: ufw firewall and unneeded services
    #[arg(long)]
    pub step3: bool,

    /// Step 4: kernel parameters and br_netfilter
    #[arg(long)]
    pub step4: bool,

    /// Step 5: auditd and rsyslog
    #[arg(long)]
    pub step5: bool,

    /// Run every step
    #[arg(long)]
    pub all: bool,

    /// Report what would change without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// JSON configuration file (built-in defaults when omitted)
    #[arg(long, value_name = "PATH", env = "HARDN_CONFIG")]
    pub config: Option<String>,

    /// Log verbosity
    #[arg(long, value_enum, default_value = "INFO", ignore_case = true)]
    pub log_level: LogLevel,

    /// Where step results are saved
    #[arg(long, value_name = "DIR", default_value = "results")]
    pub results_dir: PathBuf,

    /// Where run logs are written
    #[arg(long, value_name = "DIR", default_value = "logs")]
    pub logs_dir: PathBuf,

    /// Where original files are copied before they are changed
    #[arg(long, value_name = "DIR", default_value = "/var/backups/hardn")]
    pub backup_dir: PathBuf,
}

impl Cli {
    /// Steps named on the command line, in execution order
    pub fn selected_steps(&self) -> BTreeSet<StepId> {
        if self.all {
            return StepId::ALL.into_iter().collect();
        }
        let flags = [self.step1, self.step2, self.step3, self.step4, self.step5];
        StepId::ALL
            .into_iter()
            .zip(flags)
            .filter_map(|(id, on)| on.then_some(id))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "ERROR")]
    Error,
}

impl LogLevel {
    pub fn filter(self) -> log::LevelFilter {
        match self {
            Self::Debug => log::LevelFilter::Debug,
            Self::Info => log::LevelFilter::Info,
            Self::Warning => log::LevelFilter::Warn,
            Self::Error => log::LevelFilter::Error,
        }
    }
}
