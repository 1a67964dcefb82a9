//! `netdeploy info` — templates on disk and the deployment order.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use netdeploy_renderer::TemplateInfo;

use super::{print_json, GlobalArgs};

/// Arguments for `netdeploy info`.
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct InfoJson {
    templates: Vec<TemplateInfo>,
    devices: Vec<DeviceJson>,
}

#[derive(Serialize, Tabled)]
struct DeviceJson {
    #[tabled(rename = "order")]
    priority: u32,
    #[tabled(rename = "device")]
    name: String,
    #[tabled(rename = "role")]
    role: String,
    #[tabled(rename = "address")]
    address: String,
    #[tabled(rename = "template")]
    template: String,
}

#[derive(Tabled)]
struct TemplateRow {
    #[tabled(rename = "template")]
    name: String,
    #[tabled(rename = "size")]
    size: String,
    #[tabled(rename = "modified")]
    modified: String,
    #[tabled(rename = "valid")]
    valid: String,
}

impl InfoArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let orchestrator = global.orchestrator()?;
        let renderer = orchestrator.renderer();

        let mut templates = Vec::new();
        for name in renderer.list_templates().context("cannot list templates")? {
            let info = renderer
                .info(&name)
                .with_context(|| format!("cannot read template '{name}'"))?;
            templates.push(info);
        }
        let devices: Vec<DeviceJson> = orchestrator
            .get_devices()?
            .into_iter()
            .map(|d| DeviceJson {
                priority: d.priority,
                name: d.name.0,
                role: d.role.to_string(),
                address: d.address,
                template: d.template,
            })
            .collect();

        if self.json {
            return print_json(&InfoJson { templates, devices });
        }

        println!(
            "netdeploy v{} | {} templates in {} | {} devices",
            env!("CARGO_PKG_VERSION"),
            templates.len(),
            renderer.dir().display(),
            devices.len(),
        );
        let rows: Vec<TemplateRow> = templates
            .iter()
            .map(|t| TemplateRow {
                name: t.name.clone(),
                size: format!("{} B", t.size),
                modified: t
                    .modified
                    .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string()),
                valid: if t.validation.valid {
                    "yes".green().to_string()
                } else {
                    "no".red().to_string()
                },
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");

        println!("{}", "DEPLOYMENT ORDER".bold());
        let mut table = Table::new(devices);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
