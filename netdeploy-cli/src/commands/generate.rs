//! `netdeploy generate` — render configurations without touching devices.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use netdeploy_orchestrator::{write_config, WriteResult};

use super::GlobalArgs;

/// Arguments for `netdeploy generate`.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Only render this device.
    #[arg(long)]
    pub device: Option<String>,

    /// Print configurations to stdout. Files are then only written when
    /// `--output` is given too.
    #[arg(long)]
    pub show: bool,

    /// Directory for `<device>.cfg` files.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl GenerateArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let orchestrator = global.orchestrator()?;
        let output = match (&self.output, self.show) {
            (Some(dir), _) => Some(dir.clone()),
            (None, false) => Some(PathBuf::from("generated")),
            (None, true) => None,
        };

        let devices = match self.device.as_deref() {
            Some(name) => orchestrator
                .get_devices()?
                .into_iter()
                .filter(|d| d.name.as_str() == name)
                .collect::<Vec<_>>(),
            None => orchestrator.get_devices()?,
        };
        if devices.is_empty() {
            bail!("device '{}' is not in the inventory", self.device.unwrap_or_default());
        }

        let mut written = 0;
        let mut unchanged = 0;
        let mut failed = Vec::new();
        for device in &devices {
            let config = match orchestrator.render_device(device.name.as_str()) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("{} {}: {err}", "✗".red(), device.name);
                    failed.push(device.name.to_string());
                    continue;
                }
            };

            if self.show {
                println!("{}", format!("# ---- {} ({}) ----", device.name, device.template).bold());
                print!("{config}");
                if !config.ends_with('\n') {
                    println!();
                }
            }

            if let Some(dir) = output.as_deref() {
                let result = write_config(dir, &device.name, &config)
                    .with_context(|| format!("failed to write configuration for '{}'", device.name))?;
                match result {
                    WriteResult::Written { path } => {
                        written += 1;
                        println!("  ✎  {}", path.display());
                    }
                    WriteResult::Unchanged { path } => {
                        unchanged += 1;
                        println!("  ·  {}", path.display());
                    }
                }
            }
        }

        if let Some(dir) = output.as_deref() {
            println!(
                "{} {} ({written} written, {unchanged} unchanged)",
                "✓".green(),
                dir.display()
            );
        }
        if !failed.is_empty() {
            bail!("{} device(s) failed to render: {}", failed.len(), failed.join(", "));
        }
        Ok(())
    }
}
