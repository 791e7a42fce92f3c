//! Convergence engine - read, compare, back up, apply, verify
//!
//! Items are converged strictly one at a time. A failing item is recorded
//! and the engine moves on; nothing here aborts a step.

use crate::backup::{BackupRecord, BackupStore};
use crate::error::ItemError;
use crate::host::{Host, ProgressCallback};
use crate::item::DesiredItem;
use crate::plan::{PostAction, StepPlan};
use crate::types::{ItemOutcome, ItemStatus};
use serde::{Deserialize, Serialize};

/// Options for a convergence run
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Compute and report changes without writing anything
    pub dry_run: bool,
    /// Copy files aside before mutating them
    pub backups: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            backups: true,
        }
    }
}

/// What happened to a post-apply action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Ran,
    WouldRun,
    Failed,
    /// Not run because an earlier action of the step failed
    Skipped,
}

/// Recorded result of a post-apply action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub description: String,
    pub command: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything produced by running one step plan
#[derive(Debug, Clone, Default)]
pub struct PlanRun {
    pub outcomes: Vec<ItemOutcome>,
    pub actions: Vec<ActionOutcome>,
}

/// Converges items against a host
pub struct Engine<'h> {
    host: &'h dyn Host,
    options: EngineOptions,
    backups: BackupStore,
}

impl<'h> Engine<'h> {
    pub fn new(host: &'h dyn Host, options: EngineOptions, backups: BackupStore) -> Self {
        Self {
            host,
            options,
            backups,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Backups taken so far in this run
    pub fn backups(&self) -> &[BackupRecord] {
        self.backups.records()
    }

    /// Converge a single item
    pub fn converge(&mut self, item: &dyn DesiredItem) -> ItemOutcome {
        let outcome = ItemOutcome::new(item.id(), item.item_type());
        let desired = item.desired_state();

        let may_write = !item.requires_privilege() || self.host.is_privileged();
        if !self.options.dry_run
            && may_write
            && let Err(err) = item.prepare(self.host)
        {
            return outcome.fail("could not refresh state", describe(&err));
        }

        let current = match item.current_state(self.host) {
            Ok(state) => state,
            Err(err) => {
                return outcome.fail("could not read current state", describe(&err));
            }
        };

        if item.is_converged(&current) {
            return outcome.finish(ItemStatus::Unchanged, "unchanged");
        }

        if self.options.dry_run {
            let mut outcome = outcome.finish(
                ItemStatus::WouldChange,
                format!("would change {current} → {desired}"),
            );
            outcome.diff = item.preview(&current);
            return outcome;
        }

        if item.requires_privilege() && !self.host.is_privileged() {
            let err = ItemError::Permission {
                message: format!("{} requires root", item.description()),
            };
            return outcome.fail("not applied", describe(&err));
        }

        let mut outcome = outcome;
        if self.options.backups
            && let Some(target) = item.backup_target()
        {
            match self.backups.backup(self.host, &target) {
                Ok(record) => outcome.backup = record,
                Err(err) => {
                    return outcome.fail(
                        format!("backup of {} failed, not applied", target.display()),
                        describe(&err),
                    );
                }
            }
        }

        if let Err(err) = item.apply(self.host, &current) {
            return outcome.fail("apply failed", describe(&err));
        }

        match item.verify(self.host) {
            Ok(after) if item.is_converged(&after) => {}
            Ok(after) => outcome.warnings.push(format!(
                "applied but verification failed: expected {desired}, found {after}"
            )),
            Err(err) => outcome
                .warnings
                .push(format!("applied but verification failed: {err}")),
        }
        outcome.finish(ItemStatus::Applied, format!("changed {current} → {desired}"))
    }

    /// Converge every item of a plan in order, then its post-actions
    pub fn run_plan<P: ProgressCallback + ?Sized>(
        &mut self,
        step: &str,
        plan: &StepPlan,
        progress: &mut P,
    ) -> PlanRun {
        progress.on_plan_start(step, plan.len());

        let mut outcomes = Vec::with_capacity(plan.len());
        for item in &plan.items {
            progress.on_item_start(&item.id(), &item.description());
            let outcome = self.converge(item.as_ref());
            progress.on_item_complete(&outcome);
            outcomes.push(outcome);
        }

        let actions = self.run_post_actions(&plan.post_actions, &outcomes);
        progress.on_plan_complete(step);

        PlanRun { outcomes, actions }
    }

    fn run_post_actions(
        &self,
        actions: &[PostAction],
        outcomes: &[ItemOutcome],
    ) -> Vec<ActionOutcome> {
        let wanted = if self.options.dry_run {
            ItemStatus::WouldChange
        } else {
            ItemStatus::Applied
        };

        let mut results = Vec::new();
        let mut failed = false;
        for action in actions {
            let triggered = outcomes
                .iter()
                .any(|o| o.status == wanted && action.is_triggered_by(&o.item_id));
            if !triggered {
                continue;
            }

            let mut result = ActionOutcome {
                description: action.description.clone(),
                command: action.command_line(),
                status: ActionStatus::Ran,
                error: None,
            };

            if self.options.dry_run {
                result.status = ActionStatus::WouldRun;
            } else if failed {
                result.status = ActionStatus::Skipped;
            } else {
                let args: Vec<&str> = action.args.iter().map(String::as_str).collect();
                if let Err(err) = self.host.run_checked(&action.command, &args) {
                    log::error!("Post-action '{}' failed: {err}", action.description);
                    result.status = ActionStatus::Failed;
                    result.error = Some(describe(&err));
                    failed = true;
                } else {
                    log::info!("Post-action '{}' completed", action.description);
                }
            }
            results.push(result);
        }
        results
    }
}

fn describe(err: &ItemError) -> String {
    format!("{}: {err}", err.kind())
}
