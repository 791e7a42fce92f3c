//! env_logger setup: every record goes to stderr and to a per-run log file

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use env_logger::{Target, WriteStyle};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// `<logs_dir>/hardening_<YYYYmmdd_HHMMSS>.log`
pub fn log_path(logs_dir: &Path, started: DateTime<Local>) -> PathBuf {
    logs_dir.join(format!("hardening_{}.log", started.format("%Y%m%d_%H%M%S")))
}

/// Writes everything twice: to stderr and to the log file
struct Tee<W: Write> {
    console: W,
    file: File,
}

impl<W: Write> Write for Tee<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        // A closed terminal must not stop the file log
        let _ = self.console.write_all(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}

/// Install the global logger and return the log file path
pub fn init(level: log::LevelFilter, logs_dir: &Path, started: DateTime<Local>) -> Result<PathBuf> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create log directory {}", logs_dir.display()))?;
    let path = log_path(logs_dir, started);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;

    env_logger::Builder::new()
        .filter_level(level)
        .write_style(WriteStyle::Never)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(Tee {
            console: io::stderr(),
            file,
        })))
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(path)
}
