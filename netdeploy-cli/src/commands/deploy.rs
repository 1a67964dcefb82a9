//! `netdeploy deploy` — render and push configurations.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use netdeploy_orchestrator::{DeployOptions, DeploymentResult};

use super::{print_json, GlobalArgs};

/// Arguments for `netdeploy deploy`.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Only deploy this device.
    #[arg(long)]
    pub device: Option<String>,

    /// Render and report without opening any session.
    #[arg(long, conflicts_with = "live")]
    pub dry_run: bool,

    /// Push even when the inventory sets `dry_run_default`.
    #[arg(long)]
    pub live: bool,

    /// Attempt every device instead of stopping at the first failure.
    /// Overrides `global_settings.halt_on_failure`.
    #[arg(long, conflicts_with = "halt_on_failure")]
    pub continue_on_error: bool,

    /// Stop at the first failure even when the inventory disables halting.
    #[arg(long)]
    pub halt_on_failure: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "device")]
    device: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "lines")]
    lines: usize,
    #[tabled(rename = "time")]
    elapsed: String,
    #[tabled(rename = "detail")]
    detail: String,
}

impl DeployArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let mut orchestrator = global.orchestrator()?;
        let (dry_run, halt) = match orchestrator.inventory() {
            Some(inventory) => (
                self.dry_run || (inventory.settings.dry_run_default && !self.live),
                self.halt_on_failure
                    || (inventory.settings.halt_on_failure && !self.continue_on_error),
            ),
            None => (self.dry_run, !self.continue_on_error),
        };

        if !orchestrator
            .validate_templates()
            .context("template validation could not run")?
        {
            tracing::warn!("validation found problems; affected devices will fail to render");
        }

        let run = orchestrator.deploy(&DeployOptions {
            dry_run,
            only: self.device.clone(),
            halt_on_failure: halt,
        })?;

        if self.json {
            print_json(&run)?;
        } else {
            print_run(&run);
        }

        if !run.success && halt {
            bail!("deployment stopped: {}", run.summary());
        }
        Ok(())
    }
}

fn print_run(run: &DeploymentResult) {
    let prefix = if run.dry_run { "[dry-run] " } else { "" };
    let mut rows: Vec<ResultRow> = Vec::new();
    for name in run.successful.iter().chain(&run.failed) {
        let Some(result) = run.results.get(name) else {
            continue;
        };
        rows.push(ResultRow {
            device: name.to_string(),
            status: if result.success {
                "ok".green().to_string()
            } else {
                let stage = result
                    .stage
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                format!("{} ({stage})", "failed".red().bold())
            },
            lines: result.config_lines,
            elapsed: format!("{:.2}s", result.elapsed.as_secs_f64()),
            detail: result
                .error
                .as_ref()
                .or(result.disconnect_error.as_ref())
                .cloned()
                .unwrap_or_else(|| "-".to_string()),
        });
    }
    for name in &run.skipped {
        rows.push(ResultRow {
            device: name.to_string(),
            status: "skipped".yellow().to_string(),
            lines: 0,
            elapsed: "-".to_string(),
            detail: "earlier device failed".to_string(),
        });
    }

    if !rows.is_empty() {
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }
    let mark = if run.success { "✓".green() } else { "✗".red() };
    println!(
        "{prefix}{mark} {} in {:.1}s, {} config lines",
        run.summary(),
        run.elapsed.as_secs_f64(),
        run.total_config_lines
    );
}
