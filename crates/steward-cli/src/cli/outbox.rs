//! CLI outbox subcommands.
//!
//! Messaging actions queue rendered messages in the outbox; a delivery
//! gateway drains it. These commands let an operator inspect the queue and
//! acknowledge deliveries by hand.

use anyhow::{Result, bail};
use clap::{Subcommand, ValueEnum};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use steward_core::collaborator::Channel;

use crate::state::AppState;

#[derive(Clone, Copy, ValueEnum)]
pub enum ChannelArg {
    Email,
    Sms,
    Notification,
}

impl From<ChannelArg> for Channel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Email => Channel::Email,
            ChannelArg::Sms => Channel::Sms,
            ChannelArg::Notification => Channel::Notification,
        }
    }
}

#[derive(Subcommand)]
pub enum OutboxCommand {
    /// List messages not yet handed to a gateway, oldest first.
    #[command(alias = "ls")]
    List {
        /// Only messages for this channel.
        #[arg(long, value_enum)]
        channel: Option<ChannelArg>,

        /// Maximum number of messages to display.
        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// Mark a message as sent.
    MarkSent {
        /// Message id.
        id: String,
    },
}

pub async fn handle_outbox_command(cmd: OutboxCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        OutboxCommand::List { channel, limit } => {
            let entries = state.outbox.pending(channel.map(Channel::from), limit).await?;

            if json {
                let out: Vec<_> = entries
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "id": e.id,
                            "channel": e.channel,
                            "recipient_id": e.recipient_id,
                            "address": e.address,
                            "subject": e.subject,
                            "body": e.body,
                            "execution_id": e.execution_id,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!();
                println!("  Outbox is empty.");
                println!();
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(presets::UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    Cell::new("Id").fg(Color::Cyan),
                    Cell::new("Channel"),
                    Cell::new("To"),
                    Cell::new("Subject"),
                    Cell::new("Body"),
                ]);
            for e in &entries {
                table.add_row(vec![
                    Cell::new(&e.id),
                    Cell::new(&e.channel),
                    Cell::new(&e.address),
                    Cell::new(e.subject.as_deref().unwrap_or("-")),
                    Cell::new(&e.body),
                ]);
            }

            println!();
            println!("{table}");
            println!();
            Ok(())
        }
        OutboxCommand::MarkSent { id } => {
            if !state.outbox.mark_sent(&id).await? {
                bail!("No pending message with id '{id}'");
            }
            if json {
                println!("{}", serde_json::json!({ "id": id, "sent": true }));
            } else {
                println!();
                println!("  {} Marked {} as sent", style("*").green().bold(), style(&id).cyan());
                println!();
            }
            Ok(())
        }
    }
}
