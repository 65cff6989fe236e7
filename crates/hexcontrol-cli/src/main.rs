//! hexcontrol CLI Entry Point

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hexcontrol_cli::{commands, Cli, Commands};
use hexcontrol_hmm::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        commands::print_version();
        return Ok(());
    }

    // Stages are CPU bound; run them off the runtime and cancel on Ctrl-C.
    let token = CancellationToken::new();
    let mut worker = {
        let token = token.clone();
        tokio::task::spawn_blocking(move || commands::execute(cli.command, &token))
    };

    let outcome = tokio::select! {
        joined = &mut worker => joined,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupt received, cancelling run");
            token.cancel();
            (&mut worker).await
        }
    };

    outcome.context("pipeline task panicked")?
}
