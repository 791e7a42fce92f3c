//! In-memory host used by the crate's unit tests

use crate::error::{ItemError, Result};
use crate::host::Host;
use crate::types::CommandOutput;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub struct MemHost {
    files: RefCell<BTreeMap<PathBuf, String>>,
    failing: RefCell<BTreeSet<String>>,
    commands: RefCell<Vec<String>>,
    writes: Cell<usize>,
    privileged: bool,
}

impl Default for MemHost {
    fn default() -> Self {
        Self {
            files: RefCell::default(),
            failing: RefCell::default(),
            commands: RefCell::default(),
            writes: Cell::new(0),
            privileged: true,
        }
    }
}

impl MemHost {
    pub fn unprivileged() -> Self {
        Self {
            privileged: false,
            ..Self::default()
        }
    }

    pub fn put(&self, path: impl AsRef<Path>, contents: &str) {
        self.files
            .borrow_mut()
            .insert(path.as_ref().to_path_buf(), contents.to_string());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.borrow().get(path.as_ref()).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<PathBuf, String> {
        self.files.borrow().clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    pub fn fail_command(&self, cmd: &str) {
        self.failing.borrow_mut().insert(cmd.to_string());
    }

    pub fn ran(&self, command_line: &str) -> bool {
        self.commands.borrow().iter().any(|c| c == command_line)
    }
}

impl Host for MemHost {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut line = vec![cmd];
        line.extend_from_slice(args);
        self.commands.borrow_mut().push(line.join(" "));
        if self.failing.borrow().contains(cmd) {
            return Ok(CommandOutput::failed(1, format!("{cmd}: failed")));
        }
        Ok(CommandOutput::ok(""))
    }

    fn run_with_input(&self, cmd: &str, args: &[&str], _input: &str) -> Result<CommandOutput> {
        self.run(cmd, args)
    }

    fn read_file(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.get(path))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.writes.set(self.writes.get() + 1);
        self.put(path, contents);
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        let contents = self.get(from).ok_or_else(|| ItemError::NotFound {
            what: from.display().to_string(),
        })?;
        self.write_file(to, &contents)
    }

    fn is_privileged(&self) -> bool {
        self.privileged
    }
}
