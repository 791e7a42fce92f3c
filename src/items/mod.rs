//! Concrete item kinds for Ubuntu hosts
//!
//! Each kind knows how to read, write and verify one piece of system
//! configuration through a [`convergence::Host`]; the engine does the rest.

pub mod config_line;
pub mod file;
pub mod firewall;
pub mod kernel;
pub mod package;
pub mod service;
pub mod sysctl;
pub mod time;
pub mod user;

pub use config_line::{ConfigLine, LineStyle};
pub use file::ManagedFile;
pub use firewall::{Direction, UfwDefault, UfwEnabled, UfwRule};
pub use kernel::KernelModule;
pub use package::{Package, SystemUpgrades};
pub use service::ServiceState;
pub use sysctl::SysctlParam;
pub use time::{Ntp, Timezone};
pub use user::{AuthorizedKeys, UserAccount};

use convergence::{Host, ItemState, Result};
use similar::TextDiff;
use std::path::Path;

/// Whole-file state: `Absent` when missing, contents otherwise
pub(crate) fn file_state(host: &dyn Host, path: &Path) -> Result<ItemState> {
    Ok(host
        .read_file(path)?
        .map_or(ItemState::Absent, ItemState::Value))
}

/// Unified diff between two versions of a file
pub(crate) fn unified_diff(path: &Path, old: &str, new: &str) -> String {
    let name = path.display().to_string();
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(2)
        .header(&name, &name)
        .to_string()
}
