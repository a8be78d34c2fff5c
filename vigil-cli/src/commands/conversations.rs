//! Conversations command - inspect and prune stored conversations

use chrono::Utc;
use clap::{Args, Subcommand};

use super::session::{GlobalArgs, Session};

/// Manage stored conversations
#[derive(Args, Debug)]
pub struct ConversationsArgs {
    #[command(subcommand)]
    command: Option<ConversationsCommand>,
}

#[derive(Subcommand, Debug)]
enum ConversationsCommand {
    /// List conversations, most recent first
    #[command(visible_alias = "ls")]
    List,

    /// Print every message of one conversation
    Show {
        /// Anomaly the conversation belongs to
        anomaly_id: String,
    },

    /// Delete one conversation
    #[command(visible_alias = "rm")]
    Delete {
        /// Anomaly the conversation belongs to
        anomaly_id: String,
    },

    /// Delete every conversation
    Clear,
}

impl ConversationsArgs {
    /// Execute the conversations command
    pub async fn execute(&self, global: &GlobalArgs) -> anyhow::Result<()> {
        let session = Session::open(global)?;
        let store = session.conversations().await?;

        match self.command.as_ref().unwrap_or(&ConversationsCommand::List) {
            ConversationsCommand::List => {
                let conversations = store.list_conversations().await;
                if conversations.is_empty() {
                    println!("No conversations.");
                    return Ok(());
                }
                let now = Utc::now();
                for conversation in &conversations {
                    let title = conversation
                        .messages()
                        .first()
                        .and_then(|m| m.content.lines().next())
                        .unwrap_or_default()
                        .trim_matches('*');
                    println!(
                        "{}  {:>3} msgs  {:>8}  {}",
                        conversation.anomaly_id(),
                        conversation.messages().len(),
                        format_age((now - conversation.updated_at).num_seconds()),
                        title
                    );
                }
            }
            ConversationsCommand::Show { anomaly_id } => {
                let conversation = store
                    .get_conversation(anomaly_id)
                    .await
                    .ok_or_else(|| anyhow::anyhow!("No conversation for anomaly {}", anomaly_id))?;
                for message in conversation.messages() {
                    println!(
                        "[{} {}] {}",
                        message.timestamp.format("%Y-%m-%d %H:%M"),
                        message.role,
                        message.content
                    );
                    println!();
                }
            }
            ConversationsCommand::Delete { anomaly_id } => {
                if store.delete_conversation(anomaly_id).await? {
                    println!("Deleted conversation for {}", anomaly_id);
                } else {
                    println!("No conversation for {}", anomaly_id);
                }
            }
            ConversationsCommand::Clear => {
                let count = store.list_conversations().await.len();
                store.clear_all_conversations().await?;
                println!("Deleted {} conversation(s)", count);
            }
        }

        Ok(())
    }
}

/// Human-readable age such as "5m ago"
fn format_age(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{}s ago", seconds)
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86_400)
    }
}
