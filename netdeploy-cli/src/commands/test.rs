//! `netdeploy test` — open and close a session to each device.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use super::GlobalArgs;

/// Arguments for `netdeploy test`.
#[derive(Args, Debug)]
pub struct TestArgs {
    /// Only test this device.
    #[arg(long)]
    pub device: Option<String>,
}

#[derive(Tabled)]
struct ProbeRow {
    #[tabled(rename = "device")]
    device: String,
    #[tabled(rename = "address")]
    address: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "time")]
    elapsed: String,
    #[tabled(rename = "detail")]
    detail: String,
}

impl TestArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let mut orchestrator = global.orchestrator()?;
        let probes = orchestrator.test_connectivity(self.device.as_deref())?;

        let unreachable = probes.iter().filter(|p| !p.reachable).count();
        let rows: Vec<ProbeRow> = probes
            .into_iter()
            .map(|p| ProbeRow {
                device: p.device.to_string(),
                address: p.address,
                status: if p.reachable {
                    "reachable".green().to_string()
                } else {
                    "unreachable".red().bold().to_string()
                },
                elapsed: format!("{:.1}s", p.elapsed.as_secs_f64()),
                detail: p
                    .error
                    .or(p.disconnect_error)
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        let total = rows.len();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");

        if unreachable > 0 {
            bail!("{unreachable}/{total} device(s) unreachable");
        }
        println!("{} all {total} device(s) reachable", "✓".green());
        Ok(())
    }
}
