//! Steward CLI entry point.
//!
//! Binary name: `steward`
//!
//! Parses CLI arguments, opens the database and wires the automation engine,
//! then dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,steward=debug",
        _ => "trace",
    };
    steward_observe::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "steward", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.data_dir.clone()).await?;

    let result = match cli.command {
        Commands::Workflow { command } => {
            cli::workflow::handle_workflow_command(command, &state, cli.json).await
        }
        Commands::Dispatch(args) => cli::dispatch::handle_dispatch(args, &state, cli.json).await,
        Commands::Execution { command } => {
            cli::execution::handle_execution_command(command, &state, cli.json).await
        }
        Commands::Worker { once, events } => {
            cli::worker::handle_worker(&state, once, events, cli.json).await
        }
        Commands::Directory { command } => {
            cli::directory::handle_directory_command(command, &state, cli.json).await
        }
        Commands::Outbox { command } => {
            cli::outbox::handle_outbox_command(command, &state, cli.json).await
        }
        Commands::Completions { .. } => Ok(()),
    };

    state.db_pool.close().await;
    steward_observe::shutdown_tracing();
    result
}
