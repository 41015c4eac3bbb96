//! accelspec CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use accelspec_cli::cmd;
use accelspec_cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.global.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let global = &cli.global;
    match cli.command {
        None => cmd::resolve::resolve(global, &Default::default()),
        Some(Commands::Resolve(args)) => cmd::resolve::resolve(global, &args),
        Some(Commands::Header { dir }) => cmd::header::header(&dir),
        Some(Commands::Fetch { resource, verify }) => cmd::fetch::fetch(global, &resource, verify),
        Some(Commands::Locate { library }) => cmd::locate::locate(global, &library),
    }
}
