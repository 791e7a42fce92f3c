//! DesiredItem trait for convergent state management
//!
//! A DesiredItem is one atomic unit of configuration: a sysctl key, a line
//! in a config file, a package, a firewall rule. The engine reads it,
//! compares, writes and verifies; the item only knows how to do each of
//! those against a [`Host`].

use crate::error::Result;
use crate::host::Host;
use crate::types::ItemState;
use std::fmt;
use std::path::PathBuf;

/// Core trait for convergent items
///
/// # Example
///
/// ```ignore
/// use convergence::{DesiredItem, Host, ItemState, Result};
///
/// #[derive(Debug)]
/// struct Hostname(String);
///
/// impl DesiredItem for Hostname {
///     fn id(&self) -> String { "hostname".into() }
///     fn description(&self) -> String { format!("Set hostname to {}", self.0) }
///     fn item_type(&self) -> &'static str { "hostname" }
///
///     fn current_state(&self, host: &dyn Host) -> Result<ItemState> {
///         Ok(ItemState::value(host.run_checked("hostname", &[])?.trim()))
///     }
///
///     fn desired_state(&self) -> ItemState {
///         ItemState::value(self.0.clone())
///     }
///
///     fn apply(&self, host: &dyn Host, _current: &ItemState) -> Result<()> {
///         host.run_checked("hostnamectl", &["set-hostname", &self.0])?;
///         Ok(())
///     }
/// }
/// ```
pub trait DesiredItem: fmt::Debug {
    /// Stable identifier, namespaced by kind
    ///
    /// Examples:
    /// - "sysctl:net.ipv4.ip_forward"
    /// - "sshd:PermitRootLogin"
    /// - "ufw:allow 2379:2380/tcp"
    fn id(&self) -> String;

    /// Human-readable description of the change
    fn description(&self) -> String;

    /// Item kind, used for grouping in reports
    fn item_type(&self) -> &'static str;

    /// Whether writing needs root
    fn requires_privilege(&self) -> bool {
        true
    }

    /// Refresh what `current_state` reads from; live runs only
    ///
    /// `apt-get update` before counting pending upgrades is the typical
    /// case. Runs on every live pass, converged or not.
    fn prepare(&self, _host: &dyn Host) -> Result<()> {
        Ok(())
    }

    /// Read the current state from the host
    fn current_state(&self, host: &dyn Host) -> Result<ItemState>;

    /// The state this item converges to
    fn desired_state(&self) -> ItemState;

    /// Compare current against desired
    ///
    /// Exact equality by default. Items with set semantics (a service that
    /// may be "disabled" or "masked", a user whose groups must include a set)
    /// override this.
    fn is_converged(&self, current: &ItemState) -> bool {
        *current == self.desired_state()
    }

    /// File this item mutates, backed up before the write
    fn backup_target(&self) -> Option<PathBuf> {
        None
    }

    /// Make the change; `current` is the state read just before
    fn apply(&self, host: &dyn Host, current: &ItemState) -> Result<()>;

    /// Re-read after apply
    fn verify(&self, host: &dyn Host) -> Result<ItemState> {
        self.current_state(host)
    }

    /// Extra dry-run detail, such as a text diff
    fn preview(&self, _current: &ItemState) -> Option<String> {
        None
    }
}

/// A boxed item for type-erased storage
pub type BoxedItem = Box<dyn DesiredItem>;
