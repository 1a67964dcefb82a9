//! netdeploy — render and deploy network device configurations.
//!
//! # Usage
//!
//! ```text
//! netdeploy [-i inventory.yaml] [-t templates/] validate [--json]
//! netdeploy info [--json]
//! netdeploy test [--device <name>]
//! netdeploy generate [--device <name>] [--show] [--output <dir>]
//! netdeploy deploy [--device <name>] [--dry-run | --live] [--continue-on-error] [--json]
//! netdeploy diff [--device <name>] [--output <dir>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    deploy::DeployArgs, diff::DiffArgs, generate::GenerateArgs, info::InfoArgs, test::TestArgs,
    validate::ValidateArgs, GlobalArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "netdeploy",
    version,
    about = "Render device configurations from templates and push them over SSH",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check templates and every device's variables against them.
    Validate(ValidateArgs),

    /// List templates and the deployment order.
    Info(InfoArgs),

    /// Check that devices accept an SSH session.
    Test(TestArgs),

    /// Render configurations to files (or stdout with --show).
    Generate(GenerateArgs),

    /// Render and push configurations, device by device in priority order.
    Deploy(DeployArgs),

    /// Show how freshly rendered configurations differ from generated files.
    Diff(DiffArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    match cli.command {
        Commands::Validate(args) => args.run(&cli.global),
        Commands::Info(args) => args.run(&cli.global),
        Commands::Test(args) => args.run(&cli.global),
        Commands::Generate(args) => args.run(&cli.global),
        Commands::Deploy(args) => args.run(&cli.global),
        Commands::Diff(args) => args.run(&cli.global),
    }
}

/// Logs go to stderr so `--json` output stays parseable. `RUST_LOG` wins.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
