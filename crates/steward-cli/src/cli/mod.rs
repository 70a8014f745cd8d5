//! CLI command definitions and dispatch for the `steward` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by
//! noun (`steward workflow import`, `steward execution show`).

pub mod directory;
pub mod dispatch;
pub mod execution;
pub mod outbox;
pub mod worker;
pub mod workflow;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};
use steward_types::execution::{ActionExecutionStatus, ExecutionStatus};
use steward_types::workflow::WorkflowStatus;

/// Automate follow-up work for your congregation.
#[derive(Parser)]
#[command(name = "steward", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory (defaults to $STEWARD_DATA_DIR, then ~/.steward).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Also export execution spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage workflow definitions.
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        command: workflow::WorkflowCommand,
    },

    /// Raise a trigger and run every matching workflow.
    Dispatch(dispatch::DispatchArgs),

    /// Inspect workflow executions and their action audit trail.
    #[command(alias = "exec")]
    Execution {
        #[command(subcommand)]
        command: execution::ExecutionCommand,
    },

    /// Run the delay worker, resuming delayed actions as they fall due.
    Worker {
        /// Resume whatever is due now and exit.
        #[arg(long)]
        once: bool,

        /// Print engine events as they happen.
        #[arg(long)]
        events: bool,
    },

    /// Manage the local member/user directory.
    #[command(alias = "dir")]
    Directory {
        #[command(subcommand)]
        command: directory::DirectoryCommand,
    },

    /// Inspect messages queued for delivery.
    Outbox {
        #[command(subcommand)]
        command: outbox::OutboxCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

// ---------------------------------------------------------------------------
// Shared formatting helpers
// ---------------------------------------------------------------------------

pub(crate) fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

pub(crate) fn format_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn workflow_status_cell(status: WorkflowStatus) -> Cell {
    let color = match status {
        WorkflowStatus::Active => Color::Green,
        WorkflowStatus::Draft => Color::Yellow,
        WorkflowStatus::Paused => Color::DarkYellow,
        WorkflowStatus::Archived => Color::DarkGrey,
    };
    Cell::new(status.as_str()).fg(color)
}

pub(crate) fn execution_status_cell(status: ExecutionStatus) -> Cell {
    let color = match status {
        ExecutionStatus::Running => Color::Yellow,
        ExecutionStatus::Completed => Color::Green,
        ExecutionStatus::Failed => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}

pub(crate) fn action_status_cell(status: ActionExecutionStatus) -> Cell {
    let color = match status {
        ActionExecutionStatus::Running => Color::Yellow,
        ActionExecutionStatus::Waiting => Color::Blue,
        ActionExecutionStatus::Completed => Color::Green,
        ActionExecutionStatus::Skipped => Color::DarkGrey,
        ActionExecutionStatus::Failed => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_dispatch_with_subjects_and_payload() {
        let cli = Cli::try_parse_from([
            "steward",
            "--json",
            "dispatch",
            "donation-completed",
            "--member",
            "m1",
            "--donation",
            "d9",
            "--payload",
            r#"{"amount": 250}"#,
        ])
        .unwrap();

        assert!(cli.json);
        let Commands::Dispatch(args) = cli.command else {
            panic!("expected dispatch");
        };
        assert_eq!(args.trigger_type.as_str(), "donation-completed");
        assert_eq!(args.member.as_deref(), Some("m1"));
        assert_eq!(args.donation.as_deref(), Some("d9"));
    }

    #[test]
    fn rejects_unknown_trigger_type() {
        assert!(Cli::try_parse_from(["steward", "dispatch", "member-deleted"]).is_err());
    }

    #[test]
    fn short_id_takes_prefix() {
        let id = uuid::Uuid::nil();
        assert_eq!(short_id(&id), "00000000");
    }
}
