//! `steward worker`: run the delay worker in the foreground.
//!
//! Resumes delayed actions as they fall due until Ctrl-C. With `--events`,
//! engine events are printed as they are published.

use anyhow::Result;
use chrono::Utc;
use console::style;
use steward_types::event::EngineEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::short_id;
use crate::state::AppState;

pub async fn handle_worker(state: &AppState, once: bool, events: bool, json: bool) -> Result<()> {
    if once {
        return run_once(state, json).await;
    }

    let cancel = CancellationToken::new();
    let printer = events.then(|| spawn_event_printer(state, cancel.clone(), json));
    let worker = state.dispatcher.spawn_delay_worker(cancel.clone());

    if !json {
        println!();
        println!(
            "  {} Delay worker running (poll every {}ms). Press Ctrl-C to stop.",
            style("*").green().bold(),
            state.config.delay_poll_interval_ms
        );
        println!();
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    cancel.cancel();

    worker.await?;
    if let Some(printer) = printer {
        printer.await?;
    }
    Ok(())
}

async fn run_once(state: &AppState, json: bool) -> Result<()> {
    let now = Utc::now();
    let delays = state.dispatcher.runner().delays();
    let recovered = delays.recover_stale(now).await?;
    let resumed = state.dispatcher.resume_due(now).await?;

    if json {
        let out = serde_json::json!({ "recovered": recovered, "resumed": resumed });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Resumed {} delayed action(s)",
        style("*").green().bold(),
        resumed
    );
    if recovered > 0 {
        println!("  Re-queued {recovered} stale claim(s)");
    }
    println!();
    Ok(())
}

fn spawn_event_printer(
    state: &AppState,
    cancel: CancellationToken,
    json: bool,
) -> tokio::task::JoinHandle<()> {
    let mut rx = state.events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => received,
            };
            match event {
                Ok(event) if json => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "failed to serialize engine event"),
                },
                Ok(event) => println!("  {}", describe_event(&event)),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event printer lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// One-line human description of an engine event.
pub(crate) fn describe_event(event: &EngineEvent) -> String {
    let exec = short_id(&event.execution_id());
    match event {
        EngineEvent::ExecutionStarted {
            workflow_name,
            trigger_type,
            ..
        } => format!("[{exec}] started '{workflow_name}' on {trigger_type}"),
        EngineEvent::ActionCompleted {
            action_type,
            duration_ms,
            ..
        } => format!("[{exec}] {action_type} completed in {duration_ms}ms"),
        EngineEvent::ActionSkipped { action_type, .. } => {
            format!("[{exec}] {action_type} skipped (condition false)")
        }
        EngineEvent::ActionFailed {
            action_type, error, ..
        } => format!("[{exec}] {action_type} failed: {error}"),
        EngineEvent::ActionDelayed { delay_secs, .. } => {
            format!("[{exec}] waiting {delay_secs}s")
        }
        EngineEvent::ExecutionCompleted {
            workflow_name,
            actions_completed,
            actions_failed,
            actions_skipped,
            ..
        } => format!(
            "[{exec}] '{workflow_name}' completed ({actions_completed} ok, {actions_failed} failed, {actions_skipped} skipped)"
        ),
        EngineEvent::ExecutionFailed {
            workflow_name,
            error,
            ..
        } => format!("[{exec}] '{workflow_name}' failed: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_types::workflow::ActionType;
    use uuid::Uuid;

    #[test]
    fn describes_events_with_short_execution_id() {
        let skipped = EngineEvent::ActionSkipped {
            execution_id: Uuid::nil(),
            action_id: Uuid::nil(),
            action_type: ActionType::SendSms,
        };
        assert_eq!(
            describe_event(&skipped),
            "[00000000] send-sms skipped (condition false)"
        );

        let done = EngineEvent::ExecutionCompleted {
            execution_id: Uuid::nil(),
            workflow_name: "Welcome".to_string(),
            actions_completed: 2,
            actions_failed: 1,
            actions_skipped: 0,
        };
        assert_eq!(
            describe_event(&done),
            "[00000000] 'Welcome' completed (2 ok, 1 failed, 0 skipped)"
        );
    }
}
