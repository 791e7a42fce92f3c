//! # Convergence
//!
//! Idempotent, verifiable configuration convergence.
//!
//! Every unit of configuration is a [`DesiredItem`]. The [`Engine`] takes
//! each one through the same cycle:
//!
//! 1. read the current state through a [`Host`]
//! 2. compare it with the desired state
//! 3. stop if already converged ("unchanged") or report the change in a dry run
//! 4. back up the file the item mutates, then apply
//! 5. re-read and verify; a mismatch is a warning, not an error
//!
//! Items are grouped into a [`StepPlan`] per step, and a plan run is folded
//! into an [`ExecutionResult`] (`success`, `partial`, `failed`).
//!
//! ## Provider Traits
//!
//! - [`Host`]: runs commands and touches files on the managed machine
//! - [`ProgressCallback`]: receives item events as they happen
//!
//! Neither trait assumes a particular OS, so items can be exercised
//! against an in-memory host in tests.

pub mod backup;
pub mod engine;
pub mod error;
pub mod host;
pub mod item;
pub mod plan;
pub mod result;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use backup::{BackupRecord, BackupStore};
pub use engine::{ActionOutcome, ActionStatus, Engine, EngineOptions, PlanRun};
pub use error::{ItemError, Result};
pub use host::{Host, NoProgress, ProgressCallback, command_error};
pub use item::{BoxedItem, DesiredItem};
pub use plan::{PostAction, StepPlan};
pub use result::ExecutionResult;
pub use types::{CommandOutput, ItemOutcome, ItemState, ItemStatus, StepStatus};
