//! The real machine as a convergence host

#[cfg(test)]
pub mod fake;

use convergence::{CommandOutput, Host, ItemError, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};

/// Runs commands and touches files on the local machine
pub struct SystemHost {
    privileged: bool,
}

impl SystemHost {
    pub fn new() -> Self {
        Self {
            privileged: is_root(),
        }
    }

    fn command(cmd: &str, args: &[&str]) -> Command {
        let mut command = Command::new(cmd);
        command
            .args(args)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .env("LC_ALL", "C")
            .stdin(Stdio::null());
        command
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SystemHost {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        log::debug!("Executing: {} {}", cmd, args.join(" "));
        let output = Self::command(cmd, args)
            .output()
            .map_err(|err| spawn_error(cmd, err))?;
        Ok(output.into())
    }

    fn run_with_input(&self, cmd: &str, args: &[&str], input: &str) -> Result<CommandOutput> {
        log::debug!("Executing with stdin: {} {}", cmd, args.join(" "));
        let mut child = Self::command(cmd, args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(cmd, err))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .map_err(|err| spawn_error(cmd, err))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| spawn_error(cmd, err))?;
        Ok(output.into())
    }

    fn read_file(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ItemError::from_io(path, err)),
        }
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| ItemError::from_io(parent, err))?;
        }
        fs::write(path, contents).map_err(|err| ItemError::from_io(path, err))
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|err| ItemError::from_io(parent, err))?;
        }
        fs::copy(from, to)
            .map(|_| ())
            .map_err(|err| ItemError::from_io(from, err))
    }

    fn is_privileged(&self) -> bool {
        self.privileged
    }
}

fn spawn_error(cmd: &str, err: io::Error) -> ItemError {
    match err.kind() {
        io::ErrorKind::NotFound => ItemError::NotFound {
            what: cmd.to_string(),
        },
        io::ErrorKind::PermissionDenied => ItemError::Permission {
            message: format!("cannot execute {cmd}"),
        },
        _ => ItemError::Io {
            path: cmd.into(),
            source: err,
        },
    }
}

/// Whether the process runs with an effective uid of 0
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}
