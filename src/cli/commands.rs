//! CLI command implementations

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::app::DeadSwitch;
use crate::config::Config;
use crate::http_server::{ApiState, HttpServer};
use crate::scheduler::{CycleReport, SweepSchedule};
use crate::store::MemoryStore;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::write_json;

/// Main CLI entry point
pub fn run(cli: Cli) -> CliResult<()> {
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config, data_path } => init(&config, data_path),
        Command::Serve { config } => serve(&config),
        Command::Sweep { config } => sweep(&config),
    }
}

/// Write a default config with generated secrets. Refuses to overwrite.
pub fn init(config_path: &Path, data_path: Option<PathBuf>) -> CliResult<()> {
    if config_path.exists() {
        return Err(CliError::AlreadyInitialized(config_path.display().to_string()));
    }

    let data_path = data_path.unwrap_or_else(|| {
        config_path
            .parent()
            .map(|dir| dir.join("deadswitch-data").join("store.json"))
            .unwrap_or_else(|| PathBuf::from("deadswitch-data/store.json"))
    });
    let config = Config::generate(data_path);
    config.validate()?;

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(config_path, config.to_json()?)?;

    tracing::info!(
        config = %config_path.display(),
        data_path = %config.data_path.display(),
        "configuration written"
    );
    Ok(())
}

/// One scheduler cycle against the snapshot; prints the report.
pub fn sweep(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let app = DeadSwitch::from_config(&config)?;

    let report = app.scheduler.run_cycle();
    app.persist(&config)?;
    write_json(&report)
}

/// Serve HTTP and run the scheduler at every cron occurrence.
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let schedule = config.schedule()?;
    let app = DeadSwitch::from_config(&config)?;

    let hook_app = app.clone();
    let hook_config = config.clone();
    let state = ApiState::new(app.clone(), config.scheduler_secret.clone())
        .with_cycle_hook(Arc::new(move |_: &CycleReport| snapshot(&hook_app, &hook_config)));
    let server = HttpServer::new(config.http.clone(), state);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::BootFailed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        let ticker = tokio::spawn(run_on_schedule(app.clone(), config.clone(), schedule));

        let result = tokio::select! {
            served = server.start() => {
                served.map_err(|e| CliError::BootFailed(format!("HTTP server failed: {}", e)))
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                Ok(())
            }
        };

        ticker.abort();
        result
    })?;

    app.persist(&config)?;
    Ok(())
}

async fn run_on_schedule(app: DeadSwitch<MemoryStore>, config: Config, schedule: SweepSchedule) {
    tracing::info!(cron = schedule.expression(), "scheduler started");
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            tracing::warn!(cron = schedule.expression(), "no further occurrences; scheduler stopped");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let app = app.clone();
        let config = config.clone();
        let cycle = tokio::task::spawn_blocking(move || {
            let report = app.scheduler.run_cycle();
            snapshot(&app, &config);
            report
        })
        .await;
        if let Err(e) = cycle {
            tracing::error!(error = %e, "scheduler cycle panicked");
        }
    }
}

fn snapshot(app: &DeadSwitch<MemoryStore>, config: &Config) {
    if let Err(e) = app.persist(config) {
        tracing::error!(error = %e, "failed to save snapshot");
    }
}
