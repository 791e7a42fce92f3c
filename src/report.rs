//! Per-item log lines, saved step results and the run summary

use crate::pipeline::StepReport;
use anyhow::{Context, Result};
use convergence::{ItemOutcome, ItemStatus, ProgressCallback, StepStatus};
use std::fs;
use std::path::PathBuf;

/// Logs item events as they happen and saves each executed step's result
pub struct ResultReporter {
    results_dir: PathBuf,
    step: String,
    written: Vec<PathBuf>,
}

impl ResultReporter {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            step: String::new(),
            written: Vec::new(),
        }
    }

    /// `<results_dir>/step<N>_results_<YYYYmmdd_HHMMSS>.json`
    fn result_path(&self, report: &StepReport) -> PathBuf {
        let stamp = report.result.timestamp.format("%Y%m%d_%H%M%S");
        self.results_dir
            .join(format!("{}_results_{stamp}.json", report.step.key()))
    }

    /// Save an executed step's result as pretty JSON
    ///
    /// Skipped steps are only summarized, so nothing is written for them.
    pub fn record(&mut self, report: &StepReport) -> Result<Option<PathBuf>> {
        if report.result.status == StepStatus::Skipped {
            return Ok(None);
        }

        fs::create_dir_all(&self.results_dir).with_context(|| {
            format!("Failed to create results directory {}", self.results_dir.display())
        })?;
        let path = self.result_path(report);
        let json = serde_json::to_string_pretty(&report.result)
            .context("Failed to serialize step result")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        log::info!("Saved {} results to {}", report.step.key(), path.display());
        self.written.push(path.clone());
        Ok(Some(path))
    }

    /// Fold the step reports into the final summary
    pub fn finish(self, reports: &[StepReport]) -> RunSummary {
        let mut summary = RunSummary {
            written: self.written,
            ..RunSummary::default()
        };
        for report in reports {
            let status = report.result.status;
            match status {
                StepStatus::Success => summary.success += 1,
                StepStatus::Partial => summary.partial += 1,
                StepStatus::Failed => summary.failed += 1,
                StepStatus::Skipped => summary.skipped += 1,
            }
            summary.steps.push((report.step.to_string(), status));
            summary.notices.extend(report.notices.iter().cloned());
        }
        summary
    }
}

impl ProgressCallback for ResultReporter {
    fn on_plan_start(&mut self, step: &str, count: usize) {
        self.step = step.to_string();
        log::info!("[{step}] converging {count} item(s)");
    }

    fn on_item_start(&mut self, id: &str, description: &str) {
        log::debug!("[{}] {id}: {description}", self.step);
    }

    fn on_item_complete(&mut self, outcome: &ItemOutcome) {
        let step = &self.step;
        let id = &outcome.item_id;
        match outcome.status {
            ItemStatus::Failed => {
                for error in &outcome.errors {
                    log::error!("[{step}] {id}: {error}");
                }
            }
            _ => log::info!("[{step}] {id}: {}", outcome.detail),
        }
        if let Some(diff) = &outcome.diff {
            log::debug!("[{step}] {id} diff:\n{diff}");
        }
        if let Some(backup) = &outcome.backup {
            log::info!(
                "[{step}] {id}: backed up {} to {}",
                backup.original_path.display(),
                backup.backup_path.display()
            );
        }
        for warning in &outcome.warnings {
            log::warn!("[{step}] {id}: {warning}");
        }
    }

    fn on_plan_complete(&mut self, step: &str) {
        log::debug!("[{step}] plan complete");
    }
}

/// What the run did, for the final console output and the exit code
#[derive(Debug, Default)]
pub struct RunSummary {
    pub steps: Vec<(String, StepStatus)>,
    pub success: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
    pub written: Vec<PathBuf>,
    pub notices: Vec<String>,
}

impl RunSummary {
    pub fn executed(&self) -> usize {
        self.success + self.partial + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
