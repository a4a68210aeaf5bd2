//! tend - desired-state reconciliation CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tend_cli::cmd;
use tend_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays pipeable.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Apply {
            manifest,
            root,
            watch,
            dry_run,
        } => cmd::apply::apply(&manifest, root.as_deref(), watch, dry_run).await,
        Commands::Score { expr, tags } => cmd::score::score(&expr, &tags),
        Commands::Fingerprint { file, config } => {
            cmd::fingerprint::fingerprint(&file, config).await
        }
        Commands::Serialize { file, format } => cmd::serialize::serialize(&file, format).await,
    }
}
