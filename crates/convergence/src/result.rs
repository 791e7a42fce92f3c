//! Per-step execution results

use crate::engine::{ActionStatus, PlanRun};
use crate::types::{ItemStatus, StepStatus};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// The record of one step execution
///
/// Built once, by folding a [`PlanRun`], and not modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub step_id: String,
    pub name: String,
    pub status: StepStatus,
    pub timestamp: DateTime<Local>,
    pub details: Map<String, Value>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ExecutionResult {
    /// Result for a step that was not selected
    pub fn skipped(step_id: &str, name: &str, timestamp: DateTime<Local>) -> Self {
        Self {
            step_id: step_id.to_string(),
            name: name.to_string(),
            status: StepStatus::Skipped,
            timestamp,
            details: Map::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Fold a plan run into a step result
    ///
    /// `extra` details (dry-run flag, profile metadata, ...) are merged in
    /// after the computed ones.
    pub fn from_run(
        step_id: &str,
        name: &str,
        run: &PlanRun,
        timestamp: DateTime<Local>,
        extra: Map<String, Value>,
    ) -> Self {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for outcome in &run.outcomes {
            warnings.extend(
                outcome
                    .warnings
                    .iter()
                    .map(|w| format!("{}: {w}", outcome.item_id)),
            );
            errors.extend(
                outcome
                    .errors
                    .iter()
                    .map(|e| format!("{}: {e}", outcome.item_id)),
            );
        }

        let mut action_errors = 0;
        let mut action_warnings = 0;
        for action in &run.actions {
            match action.status {
                ActionStatus::Failed => {
                    action_errors += 1;
                    errors.push(format!(
                        "post-action '{}': {}",
                        action.description,
                        action.error.as_deref().unwrap_or("failed")
                    ));
                }
                ActionStatus::Skipped => {
                    action_warnings += 1;
                    warnings.push(format!(
                        "post-action '{}' skipped after an earlier failure",
                        action.description
                    ));
                }
                ActionStatus::Ran | ActionStatus::WouldRun => {}
            }
        }

        let status = StepStatus::fold(&run.outcomes, action_errors, action_warnings);

        let count = |s: ItemStatus| run.outcomes.iter().filter(|o| o.status == s).count();
        let mut details = Map::new();
        details.insert(
            "counts".into(),
            json!({
                "total": run.outcomes.len(),
                "unchanged": count(ItemStatus::Unchanged),
                "would_change": count(ItemStatus::WouldChange),
                "applied": count(ItemStatus::Applied),
                "failed": count(ItemStatus::Failed),
            }),
        );
        details.insert(
            "items".into(),
            serde_json::to_value(&run.outcomes).unwrap_or(Value::Null),
        );
        if !run.actions.is_empty() {
            details.insert(
                "post_actions".into(),
                serde_json::to_value(&run.actions).unwrap_or(Value::Null),
            );
        }
        details.extend(extra);

        Self {
            step_id: step_id.to_string(),
            name: name.to_string(),
            status,
            timestamp,
            details,
            warnings,
            errors,
        }
    }
}
