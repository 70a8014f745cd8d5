//! CLI directory subcommands.
//!
//! The SQLite directory is the reference identity store the built-in
//! handlers resolve recipients against and mutate. These commands seed and
//! inspect it.

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use steward_core::collaborator::{Contact, IdentityLookup, SubjectRef};

use super::format_time;
use crate::state::AppState;

#[derive(Clone, Copy, ValueEnum)]
pub enum SubjectKind {
    Member,
    User,
}

impl SubjectKind {
    fn subject(self, id: String) -> SubjectRef {
        match self {
            SubjectKind::Member => SubjectRef::Member(id),
            SubjectKind::User => SubjectRef::User(id),
        }
    }
}

#[derive(Subcommand)]
pub enum DirectoryCommand {
    /// Add or replace a member or user contact.
    Add {
        /// Contact kind.
        #[arg(value_enum)]
        kind: SubjectKind,

        /// Member or user id.
        id: String,

        /// Display name.
        #[arg(long)]
        name: Option<String>,

        /// Email address.
        #[arg(long)]
        email: Option<String>,

        /// Phone number.
        #[arg(long)]
        phone: Option<String>,
    },

    /// Show a contact and its custom fields.
    Show {
        #[arg(value_enum)]
        kind: SubjectKind,

        id: String,
    },

    /// List the members of a group.
    Group {
        /// Group id.
        group_id: String,
    },

    /// List follow-up tasks created by workflows.
    Tasks {
        /// Maximum number of tasks to display.
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

pub async fn handle_directory_command(
    cmd: DirectoryCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        DirectoryCommand::Add {
            kind,
            id,
            name,
            email,
            phone,
        } => {
            let subject = kind.subject(id.clone());
            let contact = Contact {
                id,
                display_name: name,
                email,
                phone,
            };
            state.directory.upsert_contact(&subject, &contact).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&contact)?);
            } else {
                println!();
                println!("  {} Saved {}", style("*").green().bold(), style(&subject).cyan());
                println!();
            }
            Ok(())
        }
        DirectoryCommand::Show { kind, id } => {
            let subject = kind.subject(id);
            let contact = state.directory.resolve(&subject).await?;
            let fields = state.directory.fields(&subject).await?;

            if json {
                let out = serde_json::json!({ "contact": contact, "fields": fields });
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            let dash = || "-".to_string();
            println!();
            println!("  {} {}", style("Contact:").bold(), style(&subject).cyan());
            println!("  {} {}", style("Name:").dim(), contact.display_name.unwrap_or_else(dash));
            println!("  {} {}", style("Email:").dim(), contact.email.unwrap_or_else(dash));
            println!("  {} {}", style("Phone:").dim(), contact.phone.unwrap_or_else(dash));
            for (field, value) in &fields {
                println!("  {} {}", style(format!("{field}:")).dim(), value);
            }
            println!();
            Ok(())
        }
        DirectoryCommand::Group { group_id } => {
            let members = state.directory.group_members(&group_id).await?;

            if json {
                let out: Vec<_> = members
                    .iter()
                    .map(|(member_id, role)| serde_json::json!({ "member_id": member_id, "role": role }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            println!();
            if members.is_empty() {
                println!("  Group '{group_id}' has no members.");
            } else {
                println!("  Members of '{}':", style(&group_id).cyan());
                for (member_id, role) in &members {
                    match role {
                        Some(role) => println!("    - {member_id} ({role})"),
                        None => println!("    - {member_id}"),
                    }
                }
            }
            println!();
            Ok(())
        }
        DirectoryCommand::Tasks { limit } => {
            let tasks = state.directory.list_tasks(limit).await?;

            if json {
                let out: Vec<_> = tasks
                    .iter()
                    .map(|(id, task)| serde_json::json!({ "id": id, "task": task }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            if tasks.is_empty() {
                println!();
                println!("  No follow-up tasks.");
                println!();
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(presets::UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    Cell::new("Title").fg(Color::Cyan),
                    Cell::new("Assignee"),
                    Cell::new("Member"),
                    Cell::new("Due"),
                ]);
            for (_, task) in &tasks {
                table.add_row(vec![
                    Cell::new(&task.title),
                    Cell::new(task.assignee_id.as_deref().unwrap_or("-")),
                    Cell::new(task.member_id.as_deref().unwrap_or("-")),
                    Cell::new(task.due_at.map(|t| format_time(&t)).unwrap_or_else(|| "-".to_string())),
                ]);
            }

            println!();
            println!("{table}");
            println!();
            Ok(())
        }
    }
}
