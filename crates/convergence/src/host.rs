//! Host capability and progress traits
//!
//! These traits keep the engine independent of how commands are run and
//! files are touched, so the same items run against a real machine or an
//! in-memory fake.

use crate::error::{ItemError, Result};
use crate::types::{CommandOutput, ItemOutcome};
use std::path::Path;

/// Capability to inspect and change the managed machine
///
/// Implementations decide how commands are spawned and where files live.
/// Reads must not change system state.
pub trait Host {
    /// Run a command and capture its output
    ///
    /// A missing executable is reported as `ItemError::NotFound`; a non-zero
    /// exit is *not* an error here, callers inspect `CommandOutput::success`.
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a command feeding `input` on stdin
    fn run_with_input(&self, cmd: &str, args: &[&str], input: &str) -> Result<CommandOutput>;

    /// Read a text file, `None` if it does not exist
    fn read_file(&self, path: &Path) -> Result<Option<String>>;

    /// Write a text file, creating parent directories
    fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    /// Copy a file byte-for-byte, creating parent directories of `to`
    fn copy_file(&self, from: &Path, to: &Path) -> Result<()>;

    /// Whether mutating actions are expected to be permitted
    fn is_privileged(&self) -> bool;

    /// Run a command and return stdout, turning a non-zero exit into an error
    fn run_checked(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = self.run(cmd, args)?;
        if !output.success {
            return Err(command_error(cmd, args, &output));
        }
        Ok(output.stdout_str())
    }

    /// Run a command and return just success/failure
    fn run_status(&self, cmd: &str, args: &[&str]) -> Result<bool> {
        Ok(self.run(cmd, args)?.success)
    }
}

/// Build an `ItemError::Command` from a failed output
pub fn command_error(cmd: &str, args: &[&str], output: &CommandOutput) -> ItemError {
    let mut command = cmd.to_string();
    for arg in args {
        command.push(' ');
        command.push_str(arg);
    }
    ItemError::Command {
        command,
        status: output
            .code
            .map_or_else(|| "signal".to_string(), |c| format!("exit {c}")),
        stderr: output.stderr_str().trim().to_string(),
    }
}

/// Progress callback for convergence passes
///
/// Implement this trait to log or display item events as they happen.
pub trait ProgressCallback {
    /// Called when a step's plan starts
    fn on_plan_start(&mut self, step: &str, count: usize);

    /// Called before an item is converged
    fn on_item_start(&mut self, id: &str, description: &str);

    /// Called after an item is converged
    fn on_item_complete(&mut self, outcome: &ItemOutcome);

    /// Called when the plan (including post-actions) is done
    fn on_plan_complete(&mut self, step: &str);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_plan_start(&mut self, _step: &str, _count: usize) {}
    fn on_item_start(&mut self, _id: &str, _description: &str) {}
    fn on_item_complete(&mut self, _outcome: &ItemOutcome) {}
    fn on_plan_complete(&mut self, _step: &str) {}
}
