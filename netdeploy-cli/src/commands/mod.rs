//! Subcommands and the options they share.

pub mod deploy;
pub mod diff;
pub mod generate;
pub mod info;
pub mod test;
pub mod validate;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use netdeploy_core::connection::Secret;
use netdeploy_core::ConnectionOverrides;
use netdeploy_orchestrator::{Orchestrator, OrchestratorConfig};
use netdeploy_renderer::Renderer;
use netdeploy_session::{SessionManager, SshConnector};

/// Options accepted by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Inventory file.
    #[arg(
        short,
        long,
        global = true,
        env = "NETDEPLOY_INVENTORY",
        default_value = "inventory/devices.yaml"
    )]
    pub inventory: PathBuf,

    /// Template directory.
    #[arg(
        short,
        long,
        global = true,
        env = "NETDEPLOY_TEMPLATES",
        default_value = "templates"
    )]
    pub templates: PathBuf,

    /// SSH user for every device, unless a device sets its own.
    #[arg(long, global = true, env = "NETDEPLOY_USERNAME")]
    pub username: Option<String>,

    /// SSH password, used when no key file is usable.
    #[arg(long, global = true, env = "NETDEPLOY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// SSH private key.
    #[arg(long, global = true, env = "NETDEPLOY_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Log progress to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    fn overrides(&self) -> ConnectionOverrides {
        ConnectionOverrides {
            username: self.username.clone(),
            password: self.password.clone().map(Secret::new),
            key_file: self.key_file.clone(),
            ..ConnectionOverrides::default()
        }
    }

    /// Orchestrator over SSH with the inventory already loaded.
    pub fn orchestrator(&self) -> Result<Orchestrator<SshConnector>> {
        let renderer = Renderer::new(&self.templates).with_context(|| {
            format!("cannot open template directory {}", self.templates.display())
        })?;
        let sessions = SessionManager::new(SshConnector::new());
        let config = OrchestratorConfig {
            connection: self.overrides(),
        };
        let mut orchestrator = Orchestrator::new(renderer, sessions, config);
        orchestrator.load_inventory(&self.inventory).with_context(|| {
            format!("failed to load inventory {}", self.inventory.display())
        })?;
        Ok(orchestrator)
    }
}

/// Shorten a list of names for a table cell.
pub(crate) fn summarize(names: &[String], limit: usize) -> String {
    if names.is_empty() {
        return "-".to_string();
    }
    let mut shown: Vec<String> = names.iter().take(limit).cloned().collect();
    if names.len() > shown.len() {
        shown.push(format!("+{} more", names.len() - shown.len()));
    }
    shown.join(", ")
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON output")?
    );
    Ok(())
}
