//! CLI execution inspection subcommands.
//!
//! Read-only views over the audit trail: executions, their action
//! executions, and the delay queue.

use anyhow::{Context, Result, anyhow};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use steward_core::repository::delay::DelayRepository;
use steward_core::repository::workflow::WorkflowRepository;
use steward_types::execution::{ActionExecution, WorkflowExecution};

use super::{action_status_cell, execution_status_cell, format_time, short_id};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum ExecutionCommand {
    /// List recent executions, newest first.
    #[command(alias = "ls")]
    List {
        /// Only executions of this workflow (name or UUID).
        #[arg(long)]
        workflow: Option<String>,

        /// Only executions still running or waiting on a delay.
        #[arg(long, conflicts_with = "workflow")]
        running: bool,

        /// Maximum number of executions to display.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Show one execution and its action audit trail.
    Show {
        /// Execution UUID.
        id: String,
    },

    /// List delayed actions waiting to resume.
    Delays {
        /// Maximum number of delays to display.
        #[arg(long, default_value = "50")]
        limit: u32,
    },
}

pub async fn handle_execution_command(
    cmd: ExecutionCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        ExecutionCommand::List {
            workflow,
            running,
            limit,
        } => handle_list(workflow.as_deref(), running, limit, state, json).await,
        ExecutionCommand::Show { id } => handle_show(&id, state, json).await,
        ExecutionCommand::Delays { limit } => handle_delays(limit, state, json).await,
    }
}

fn execution_json(e: &WorkflowExecution) -> serde_json::Value {
    serde_json::json!({
        "id": e.id.to_string(),
        "workflow_id": e.workflow_id.to_string(),
        "workflow_name": e.workflow_name,
        "trigger_type": e.trigger.trigger_type.as_str(),
        "status": e.status.as_str(),
        "started_at": e.started_at.to_rfc3339(),
        "completed_at": e.completed_at.map(|t| t.to_rfc3339()),
        "error": e.error,
    })
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(
    workflow: Option<&str>,
    running: bool,
    limit: u32,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let executions = if running {
        let mut all = state.workflows.list_running_executions().await?;
        all.truncate(limit as usize);
        all
    } else {
        // A deleted workflow's history is still reachable by its UUID.
        let workflow_id = match workflow {
            Some(key) => match key.parse::<Uuid>() {
                Ok(id) => Some(id),
                Err(_) => Some(state.catalog.find(key).await?.id),
            },
            None => None,
        };
        state
            .workflows
            .list_executions(workflow_id.as_ref(), limit)
            .await?
    };

    if json {
        let out: Vec<_> = executions.iter().map(execution_json).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!();
        println!("  No executions recorded.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Execution").fg(Color::Cyan),
            Cell::new("Workflow"),
            Cell::new("Trigger"),
            Cell::new("Status"),
            Cell::new("Started"),
            Cell::new("Completed"),
        ]);

    for e in &executions {
        let completed = e
            .completed_at
            .map(|t| format_time(&t))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(short_id(&e.id)),
            Cell::new(&e.workflow_name),
            Cell::new(e.trigger.trigger_type.as_str()),
            execution_status_cell(e.status),
            Cell::new(format_time(&e.started_at)),
            Cell::new(completed),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

async fn handle_show(id: &str, state: &AppState, json: bool) -> Result<()> {
    let id: Uuid = id
        .parse()
        .with_context(|| format!("'{id}' is not an execution UUID"))?;
    let execution = state
        .workflows
        .get_execution(&id)
        .await?
        .ok_or_else(|| anyhow!("Execution {id} not found"))?;
    let actions = state.workflows.list_action_executions(&id).await?;

    if json {
        let out = serde_json::json!({
            "execution": execution,
            "actions": actions,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} ({})",
        style("Execution:").bold(),
        style(execution.id).cyan(),
        execution.workflow_name
    );
    println!("  {} {}", style("Status:").dim(), execution.status);
    println!("  {} {}", style("Trigger:").dim(), execution.trigger.trigger_type);
    println!("  {} {}", style("Started:").dim(), format_time(&execution.started_at));
    if let Some(completed) = execution.completed_at {
        println!("  {} {}", style("Completed:").dim(), format_time(&completed));
    }
    if let Some(error) = &execution.error {
        println!("  {} {}", style("Error:").red(), error);
    }
    println!();

    if actions.is_empty() {
        println!("  No actions recorded.");
        println!();
        return Ok(());
    }

    println!("{}", action_table(&actions));
    println!();
    Ok(())
}

fn action_table(actions: &[ActionExecution]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Order").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Status"),
            Cell::new("Executed"),
            Cell::new("Detail"),
        ]);

    for a in actions {
        let executed = a
            .executed_at
            .map(|t| format_time(&t))
            .unwrap_or_else(|| "-".to_string());
        let detail = match (&a.error, &a.result) {
            (Some(error), _) => match a.error_kind {
                Some(kind) => format!("[{}] {error}", kind.as_str()),
                None => error.clone(),
            },
            (None, Some(result)) => result.to_string(),
            (None, None) => String::new(),
        };
        table.add_row(vec![
            Cell::new(a.action_order),
            Cell::new(a.action_type.as_str()),
            action_status_cell(a.status),
            Cell::new(executed),
            Cell::new(detail),
        ]);
    }
    table
}

// ---------------------------------------------------------------------------
// Delays
// ---------------------------------------------------------------------------

async fn handle_delays(limit: u32, state: &AppState, json: bool) -> Result<()> {
    let delays = state.delays.list_pending(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&delays)?);
        return Ok(());
    }

    if delays.is_empty() {
        println!();
        println!("  No delayed actions pending.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Delay").fg(Color::Cyan),
            Cell::new("Execution"),
            Cell::new("Due"),
            Cell::new("Claimed"),
        ]);

    for d in &delays {
        let claimed = d
            .claimed_at
            .map(|t| format_time(&t))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(short_id(&d.id)),
            Cell::new(short_id(&d.execution_id)),
            Cell::new(format_time(&d.due_at)),
            Cell::new(claimed),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
