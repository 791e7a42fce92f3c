//! Step plans - the ordered items of one step plus follow-up actions

use crate::item::{BoxedItem, DesiredItem};

/// A command run after a step's items, when some of them changed
///
/// `trigger` is an item id prefix; the action only runs if an item whose id
/// starts with it was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostAction {
    pub description: String,
    pub command: String,
    pub args: Vec<String>,
    pub trigger: String,
}

impl PostAction {
    pub fn new(description: &str, command: &str, args: &[&str], trigger: &str) -> Self {
        Self {
            description: description.to_string(),
            command: command.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            trigger: trigger.to_string(),
        }
    }

    /// The command line, for display
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_triggered_by(&self, item_id: &str) -> bool {
        item_id.starts_with(&self.trigger)
    }
}

/// Ordered items of one step
#[derive(Default)]
pub struct StepPlan {
    /// Converged in order, one at a time
    pub items: Vec<BoxedItem>,
    /// Run after all items, in order
    pub post_actions: Vec<PostAction>,
}

impl StepPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item
    pub fn push(&mut self, item: impl DesiredItem + 'static) {
        self.items.push(Box::new(item));
    }

    /// Add a post-apply action, ignoring exact duplicates
    pub fn add_post_action(&mut self, action: PostAction) {
        if !self.post_actions.contains(&action) {
            self.post_actions.push(action);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item ids in plan order
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.id()).collect()
    }
}
