//! Runs the selected steps in order against one host

use crate::config::Config;
use crate::report::ResultReporter;
use crate::steps::{Step, StepId, standard_steps};
use chrono::Local;
use convergence::{BackupStore, Engine, EngineOptions, ExecutionResult, Host};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const OS_RELEASE: &str = "/etc/os-release";
const SUPPORTED_RELEASE: &str = "22.04";

/// Everything a run needs besides the configuration
pub struct RunContext<'h> {
    pub host: &'h dyn Host,
    pub dry_run: bool,
    pub backups: bool,
    pub backup_dir: PathBuf,
}

impl<'h> RunContext<'h> {
    /// `--dry-run` and the config's `dry_run` are OR-ed
    pub fn new(host: &'h dyn Host, config: &Config, dry_run: bool, backup_dir: &Path) -> Self {
        Self {
            host,
            dry_run: dry_run || config.dry_run,
            backups: config.backup_configs,
            backup_dir: backup_dir.to_path_buf(),
        }
    }
}

/// One step's result and what the operator should know about it
#[derive(Debug)]
pub struct StepReport {
    pub step: StepId,
    pub result: ExecutionResult,
    pub notices: Vec<String>,
}

pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    pub fn new(mut steps: Vec<Box<dyn Step>>) -> Self {
        steps.sort_by_key(|s| s.id());
        Self { steps }
    }

    pub fn standard() -> Self {
        Self::new(standard_steps())
    }

    /// Run every selected step; unselected ones are reported as skipped
    ///
    /// A failing step never stops the ones after it. All steps share one
    /// engine so backups taken during the run accumulate in one store.
    pub fn run(
        &self,
        ctx: &RunContext<'_>,
        config: &Config,
        selected: &BTreeSet<StepId>,
        reporter: &mut ResultReporter,
    ) -> Vec<StepReport> {
        let options = EngineOptions {
            dry_run: ctx.dry_run,
            backups: ctx.backups,
        };
        let mut engine = Engine::new(ctx.host, options, BackupStore::new(&ctx.backup_dir));
        let mut reports = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let id = step.id();
            let key = id.key();

            if !selected.contains(&id) {
                log::debug!("{id} not selected, skipping");
                let result = ExecutionResult::skipped(&key, step.name(), Local::now());
                reports.push(StepReport {
                    step: id,
                    result,
                    notices: Vec::new(),
                });
                continue;
            }

            log::info!("Starting {id}");
            let plan = step.plan(config);
            let run = engine.run_plan(&key, &plan, reporter);

            let mut extra = Map::new();
            extra.insert("dry_run".into(), Value::Bool(ctx.dry_run));
            extra.insert("metadata".into(), config.metadata());
            let result = ExecutionResult::from_run(&key, step.name(), &run, Local::now(), extra);
            log::info!("{id} finished: {}", result.status.as_str());

            let notices = if ctx.dry_run {
                Vec::new()
            } else {
                step.notices(&run)
            };

            let report = StepReport {
                step: id,
                result,
                notices,
            };
            if let Err(err) = reporter.record(&report) {
                log::error!("Could not save results for {id}: {err:#}");
            }
            reports.push(report);
        }

        let backups = engine.backups();
        if !backups.is_empty() {
            log::info!("{} file(s) backed up under {}", backups.len(), ctx.backup_dir.display());
        }
        reports
    }
}

/// Warnings about the host that do not stop a run
pub fn preflight(host: &dyn Host, dry_run: bool) -> Vec<String> {
    let mut warnings = Vec::new();

    if !host.is_privileged() {
        if dry_run {
            warnings.push("Not running as root; a live run would need root privileges".to_string());
        } else {
            warnings.push("Not running as root; changes will fail with permission errors".to_string());
        }
    }

    match host.read_file(Path::new(OS_RELEASE)) {
        Ok(Some(contents)) => {
            let field = |name: &str| {
                contents.lines().find_map(|line| {
                    line.strip_prefix(name)
                        .and_then(|rest| rest.strip_prefix('='))
                        .map(|v| v.trim_matches('"').to_string())
                })
            };
            let id = field("ID").unwrap_or_default();
            let version = field("VERSION_ID").unwrap_or_default();
            if id != "ubuntu" || !version.starts_with(SUPPORTED_RELEASE) {
                warnings.push(format!(
                    "Built for Ubuntu {SUPPORTED_RELEASE}, detected {id} {version}"
                ));
            }
        }
        Ok(None) => warnings.push(format!("{OS_RELEASE} not found; cannot confirm the OS release")),
        Err(err) => warnings.push(format!("Could not read {OS_RELEASE}: {err}")),
    }

    warnings
}
