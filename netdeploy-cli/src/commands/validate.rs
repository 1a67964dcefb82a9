//! `netdeploy validate` — template syntax and per-device variable checks.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use super::{print_json, summarize, GlobalArgs};

/// Arguments for `netdeploy validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct TemplateRow {
    #[tabled(rename = "template")]
    name: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "required variables")]
    required: String,
    #[tabled(rename = "errors")]
    errors: String,
}

#[derive(Tabled)]
struct MissingRow {
    #[tabled(rename = "device")]
    device: String,
    #[tabled(rename = "missing variables")]
    missing: String,
}

impl ValidateArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let mut orchestrator = global.orchestrator()?;
        let ok = orchestrator
            .validate_templates()
            .context("template validation could not run")?;
        let report = orchestrator
            .validation_report()
            .context("validation produced no report")?;

        if self.json {
            print_json(report)?;
        } else {
            let rows: Vec<TemplateRow> = report
                .templates
                .values()
                .map(|t| TemplateRow {
                    name: t.name.clone(),
                    status: if t.valid {
                        "valid".green().to_string()
                    } else {
                        "INVALID".red().bold().to_string()
                    },
                    required: summarize(&t.variables, 4),
                    errors: if t.errors.is_empty() {
                        "-".to_string()
                    } else {
                        t.errors.join("; ")
                    },
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");

            if !report.missing_variables.is_empty() {
                let rows: Vec<MissingRow> = report
                    .missing_variables
                    .iter()
                    .map(|(device, missing)| MissingRow {
                        device: device.to_string(),
                        missing: missing.join(", "),
                    })
                    .collect();
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{table}");
            }
        }

        if !ok {
            bail!(
                "validation failed: {} invalid template(s), {} device(s) with missing variables",
                report.templates.values().filter(|t| !t.valid).count(),
                report.missing_variables.len()
            );
        }
        if !self.json {
            println!("{} all templates and devices are valid", "✓".green());
        }
        Ok(())
    }
}
