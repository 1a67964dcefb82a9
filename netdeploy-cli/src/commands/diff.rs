//! `netdeploy diff` — unified diffs between fresh renders and generated files.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use netdeploy_orchestrator::diff_config;

use super::GlobalArgs;

/// Arguments for `netdeploy diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Only diff this device.
    #[arg(long)]
    pub device: Option<String>,

    /// Directory holding previously generated `<device>.cfg` files.
    #[arg(long, short, default_value = "generated")]
    pub output: PathBuf,
}

impl DiffArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let orchestrator = global.orchestrator()?;
        let devices: Vec<_> = orchestrator
            .get_devices()?
            .into_iter()
            .filter(|d| self.device.as_deref().map_or(true, |only| d.name.as_str() == only))
            .collect();
        if devices.is_empty() {
            bail!("device '{}' is not in the inventory", self.device.unwrap_or_default());
        }

        let mut failed = Vec::new();
        for device in &devices {
            let rendered = match orchestrator.render_device(device.name.as_str()) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("{}: {err}", device.name);
                    failed.push(device.name.to_string());
                    continue;
                }
            };
            let diff = diff_config(&self.output, &device.name, &rendered)
                .with_context(|| format!("diff failed for '{}'", device.name))?;
            match diff {
                None => println!("No differences for '{}'.", device.name),
                Some(diff) => {
                    print!("{}", diff.unified_diff);
                    if !diff.unified_diff.ends_with('\n') {
                        println!();
                    }
                }
            }
        }

        if !failed.is_empty() {
            bail!("{} device(s) failed to render: {}", failed.len(), failed.join(", "));
        }
        Ok(())
    }
}
