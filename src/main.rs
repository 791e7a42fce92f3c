mod cli;
mod config;
mod host;
mod items;
mod logging;
mod pipeline;
mod report;
mod steps;
mod ui;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use cli::Cli;
use config::{Config, ConfigError};
use convergence::Host;
use host::SystemHost;
use pipeline::{Pipeline, RunContext};
use report::ResultReporter;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err:#}");
            ui::error(&format!("{err:#}"));
            if err.chain().any(|cause| cause.is::<ConfigError>()) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let started = Local::now();
    let log_file = logging::init(cli.log_level.filter(), &cli.logs_dir, started)?;
    log::info!("hardn {} starting", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => Config::load(path).context("Invalid configuration")?,
        None => {
            log::info!("No configuration file given, using built-in defaults");
            Config::default()
        }
    };

    let host = SystemHost::new();
    let ctx = RunContext::new(&host, &config, cli.dry_run, &cli.backup_dir);
    for warning in pipeline::preflight(&host, ctx.dry_run) {
        log::warn!("{warning}");
        ui::warn(&warning);
    }

    let selected = cli.selected_steps();
    let mode = if ctx.dry_run { " (dry run)" } else { "" };
    ui::header(&format!("hardn {}{mode}", env!("CARGO_PKG_VERSION")));
    if let Some(profile) = &config.cis_profile {
        ui::kv("profile", profile);
    }
    ui::kv("privileged", &host.is_privileged().to_string());
    ui::kv("backups", &ctx.backups.to_string());

    let mut reporter = ResultReporter::new(&cli.results_dir);
    let reports = Pipeline::standard().run(&ctx, &config, &selected, &mut reporter);
    let summary = reporter.finish(&reports);

    ui::print_summary(&summary, ctx.dry_run, &log_file);
    log::info!(
        "Run finished: {} step(s) run, {} failed",
        summary.executed(),
        summary.failed
    );

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
