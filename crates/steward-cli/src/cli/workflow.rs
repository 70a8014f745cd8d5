//! CLI workflow management subcommands.
//!
//! Provides import, check, list, show, activate, pause, archive, and delete
//! operations for workflow definitions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use steward_core::workflow::definition::serialize_workflow_yaml;
use steward_types::workflow::Workflow;

use super::{format_time, short_id, workflow_status_cell};
use crate::state::AppState;

/// Workflow management subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Import (or replace by name) a workflow from a YAML file.
    Import {
        /// Path to the workflow YAML file.
        file: PathBuf,

        /// Activate the workflow right after importing it.
        #[arg(long)]
        activate: bool,
    },

    /// Validate a workflow YAML file without saving it.
    Check {
        /// Path to the workflow YAML file.
        file: PathBuf,
    },

    /// List workflow definitions.
    #[command(alias = "ls")]
    List,

    /// Show a workflow definition and its actions.
    Show {
        /// Workflow name or UUID.
        key: String,

        /// Print the definition as YAML.
        #[arg(long)]
        yaml: bool,
    },

    /// Activate a workflow so matching triggers start it.
    Activate {
        /// Workflow name or UUID.
        key: String,
    },

    /// Pause a workflow; it stops matching new triggers.
    Pause {
        /// Workflow name or UUID.
        key: String,
    },

    /// Archive a workflow permanently.
    Archive {
        /// Workflow name or UUID.
        key: String,
    },

    /// Delete a workflow definition. Execution history is kept.
    #[command(alias = "rm")]
    Delete {
        /// Workflow name or UUID.
        key: String,
    },
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        WorkflowCommand::Import { file, activate } => {
            handle_import(&file, activate, state, json).await
        }
        WorkflowCommand::Check { file } => handle_check(&file, state, json).await,
        WorkflowCommand::List => handle_list(state, json).await,
        WorkflowCommand::Show { key, yaml } => handle_show(&key, yaml, state, json).await,
        WorkflowCommand::Activate { key } => {
            let wf = state.catalog.activate(&key).await?;
            print_transition(&wf, "Activated", json)
        }
        WorkflowCommand::Pause { key } => {
            let wf = state.catalog.pause(&key).await?;
            print_transition(&wf, "Paused", json)
        }
        WorkflowCommand::Archive { key } => {
            let wf = state.catalog.archive(&key).await?;
            print_transition(&wf, "Archived", json)
        }
        WorkflowCommand::Delete { key } => {
            let wf = state.catalog.delete(&key).await?;
            print_transition(&wf, "Deleted", json)
        }
    }
}

async fn read_yaml(file: &Path) -> Result<String> {
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read workflow file {}", file.display()))
}

fn workflow_json(wf: &Workflow) -> serde_json::Value {
    serde_json::json!({
        "id": wf.id.to_string(),
        "name": wf.name,
        "trigger_type": wf.trigger_type.as_str(),
        "status": wf.status.as_str(),
        "is_active": wf.is_active,
        "actions": wf.actions.len(),
        "updated_at": wf.updated_at.to_rfc3339(),
    })
}

// ---------------------------------------------------------------------------
// Import / Check
// ---------------------------------------------------------------------------

async fn handle_import(file: &Path, activate: bool, state: &AppState, json: bool) -> Result<()> {
    let yaml = read_yaml(file).await?;
    let mut wf = state.catalog.import_yaml(&yaml).await?;
    if activate {
        wf = state.catalog.activate(&wf.id.to_string()).await?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&workflow_json(&wf))?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Imported workflow '{}'",
        style("*").green().bold(),
        style(&wf.name).cyan()
    );
    println!("  {} {}", style("ID:").dim(), wf.id);
    println!("  {} {}", style("Trigger:").dim(), wf.trigger_type);
    println!("  {} {}", style("Actions:").dim(), wf.actions.len());
    println!("  {} {}", style("Status:").dim(), wf.status);
    if !wf.is_enabled() {
        println!();
        println!(
            "  Activate it with: {}",
            style(format!("steward workflow activate \"{}\"", wf.name)).dim()
        );
    }
    println!();
    Ok(())
}

async fn handle_check(file: &Path, state: &AppState, json: bool) -> Result<()> {
    let yaml = read_yaml(file).await?;
    let wf = state.catalog.check_yaml(&yaml)?;

    if json {
        let mut out = workflow_json(&wf);
        out["valid"] = serde_json::Value::Bool(true);
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} '{}' is valid ({} actions, trigger {})",
        style("*").green().bold(),
        style(&wf.name).cyan(),
        wf.actions.len(),
        wf.trigger_type
    );
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// List / Show
// ---------------------------------------------------------------------------

async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let workflows = state.catalog.list().await?;

    if json {
        let out: Vec<_> = workflows.iter().map(workflow_json).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if workflows.is_empty() {
        println!();
        println!("  No workflows defined.");
        println!(
            "  Import one with: {}",
            style("steward workflow import <file.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("ID"),
            Cell::new("Trigger"),
            Cell::new("Status"),
            Cell::new("Actions"),
            Cell::new("Updated"),
        ]);

    for wf in &workflows {
        table.add_row(vec![
            Cell::new(&wf.name),
            Cell::new(short_id(&wf.id)),
            Cell::new(wf.trigger_type.as_str()),
            workflow_status_cell(wf.status),
            Cell::new(wf.actions.len()),
            Cell::new(format_time(&wf.updated_at)),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn handle_show(key: &str, yaml: bool, state: &AppState, json: bool) -> Result<()> {
    let wf = state.catalog.find(key).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&wf)?);
        return Ok(());
    }
    if yaml {
        print!("{}", serialize_workflow_yaml(&wf)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style("Workflow:").bold(), style(&wf.name).cyan());
    if let Some(description) = &wf.description {
        println!("  {}", style(description).dim());
    }
    println!("  {} {}", style("ID:").dim(), wf.id);
    println!("  {} {}", style("Trigger:").dim(), wf.trigger_type);
    println!("  {} {}", style("Status:").dim(), wf.status);
    println!();

    if wf.actions.is_empty() {
        println!("  No actions.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Order").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Delay"),
            Cell::new("Condition"),
        ]);

    for action in wf.ordered_actions() {
        let delay = if action.delay_secs == 0 {
            "-".to_string()
        } else {
            format!("{}s", action.delay_secs)
        };
        table.add_row(vec![
            Cell::new(action.order),
            Cell::new(action.action_type.as_str()),
            Cell::new(delay),
            Cell::new(action.condition.as_deref().unwrap_or("-")),
        ]);
    }

    println!("{table}");
    println!();
    Ok(())
}

fn print_transition(wf: &Workflow, verb: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&workflow_json(wf))?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} workflow '{}' (status: {})",
        style("*").green().bold(),
        verb,
        style(&wf.name).cyan(),
        wf.status
    );
    println!();
    Ok(())
}
