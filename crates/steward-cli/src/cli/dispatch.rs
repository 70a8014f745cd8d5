//! `steward dispatch`: raise a trigger by hand.
//!
//! Runs every active workflow matching the trigger and waits until each one
//! completes or suspends on a delay.

use anyhow::{Context, Result, bail};
use clap::Args;
use console::style;
use serde_json::Value;

use steward_types::trigger::TriggerContext;
use steward_types::workflow::TriggerType;

use super::short_id;
use crate::state::AppState;

#[derive(Args)]
pub struct DispatchArgs {
    /// Trigger type (member-created, member-updated, donation-completed,
    /// event-registered, event-checked-in, group-joined).
    pub trigger_type: TriggerType,

    /// Member the trigger concerns.
    #[arg(long)]
    pub member: Option<String>,

    /// User the trigger concerns.
    #[arg(long)]
    pub user: Option<String>,

    /// Donation the trigger concerns.
    #[arg(long)]
    pub donation: Option<String>,

    /// Event the trigger concerns.
    #[arg(long)]
    pub event: Option<String>,

    /// Group the trigger concerns.
    #[arg(long)]
    pub group: Option<String>,

    /// Extra trigger payload as a JSON object.
    #[arg(long)]
    pub payload: Option<String>,
}

pub(crate) fn build_trigger(args: DispatchArgs) -> Result<TriggerContext> {
    let mut trigger = TriggerContext::new(args.trigger_type);
    trigger.subjects.member_id = args.member;
    trigger.subjects.user_id = args.user;
    trigger.subjects.donation_id = args.donation;
    trigger.subjects.event_id = args.event;
    trigger.subjects.group_id = args.group;

    if let Some(raw) = args.payload {
        let parsed: Value = serde_json::from_str(&raw).context("Invalid --payload JSON")?;
        let Value::Object(map) = parsed else {
            bail!("--payload must be a JSON object");
        };
        trigger.payload = map;
    }

    Ok(trigger)
}

pub async fn handle_dispatch(args: DispatchArgs, state: &AppState, json: bool) -> Result<()> {
    let trigger = build_trigger(args)?;
    let trigger_type = trigger.trigger_type;
    let report = state.dispatcher.dispatch_and_wait(trigger).await;

    if json {
        let out = serde_json::json!({
            "trigger_type": trigger_type.as_str(),
            "matched": report.matched,
            "completed": report.completed,
            "suspended": report.suspended,
            "failed": report.failed,
            "execution_ids": report.execution_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    if report.matched == 0 {
        println!(
            "  No active workflows match '{}'.",
            style(trigger_type).cyan()
        );
        println!();
        return Ok(());
    }

    println!(
        "  {} Dispatched '{}' to {} workflow(s)",
        style("*").green().bold(),
        style(trigger_type).cyan(),
        report.matched
    );
    println!(
        "  {} completed, {} waiting on a delay, {} failed",
        style(report.completed).green(),
        style(report.suspended).blue(),
        style(report.failed).red()
    );
    for id in &report.execution_ids {
        println!("    {} {}", style("-").dim(), short_id(id));
    }
    if report.suspended > 0 {
        println!();
        println!(
            "  Delayed actions resume under: {}",
            style("steward worker").dim()
        );
    }
    println!();
    Ok(())
}
