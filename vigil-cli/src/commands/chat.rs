//! Chat command - discuss an anomaly with the model

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use vigil_core::conversation::build_anomaly_context;
use vigil_core::{Anomaly, Conversation, Role};

use super::session::{print_anomalies, GlobalArgs, Session};

/// Start or continue the conversation about one anomaly of a file
///
/// A conversation about the same finding from an earlier run is resumed.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// File to analyze
    #[arg(required_unless_present = "resume")]
    file: Option<PathBuf>,

    /// 1-based position of the anomaly in the analysis output
    #[arg(short = 'n', long, default_value_t = 1)]
    index: usize,

    /// Continue the stored conversation of this anomaly id without analyzing
    #[arg(long, value_name = "ANOMALY_ID", conflicts_with = "file")]
    resume: Option<String>,

    /// Send a single message and exit instead of reading from stdin
    #[arg(short, long)]
    message: Option<String>,
}

impl ChatArgs {
    /// Execute the chat command
    pub async fn execute(&self, global: &GlobalArgs) -> anyhow::Result<()> {
        let session = Session::open(global)?;
        session.require_configured()?;
        let store = session.conversations().await?;

        let (anomaly, conversation) = match (&self.resume, &self.file) {
            (Some(anomaly_id), _) => {
                let conversation = store
                    .get_conversation(anomaly_id)
                    .await
                    .ok_or_else(|| anyhow::anyhow!("No conversation for anomaly {}", anomaly_id))?;
                let Some(anomaly) = conversation.anomaly().cloned() else {
                    anyhow::bail!(
                        "Conversation for {} has no stored anomaly; chat about its file instead",
                        anomaly_id
                    );
                };
                (anomaly, conversation)
            }
            (None, Some(file)) => {
                let found = self.pick_anomaly(&session, file).await?;
                match store.find_for_finding(&found).await {
                    Some(existing) => {
                        tracing::debug!(
                            anomaly = %existing.anomaly_id(),
                            "Resuming conversation about the same finding"
                        );
                        let anomaly = existing.anomaly().cloned().unwrap_or(found);
                        (anomaly, existing)
                    }
                    None => {
                        let conversation = store.start_conversation(&found).await?;
                        (found, conversation)
                    }
                }
            }
            (None, None) => anyhow::bail!("A file or --resume is required"),
        };
        println!("Conversation {} (resume with --resume {})", conversation.id(), anomaly.id);
        println!();
        print_messages(&conversation, 0);

        let context = build_anomaly_context(&anomaly, session.engine.workspace().as_ref()).await;

        if let Some(message) = &self.message {
            let seen = conversation.messages().len() + 1;
            let updated = store
                .send_message(&anomaly.id, message, &context, &CancellationToken::new())
                .await?;
            print_messages(&updated, seen);
            return Ok(());
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "exit" | "quit") {
                break;
            }

            let seen = store
                .get_conversation(&anomaly.id)
                .await
                .map_or(0, |c| c.messages().len())
                + 1;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });
            let outcome = store.send_message(&anomaly.id, line, &context, &cancel).await;
            interrupt.abort();

            match outcome {
                Ok(updated) => print_messages(&updated, seen),
                Err(vigil_core::Error::Cancelled) => println!("(cancelled)"),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Ok(())
    }

    /// Analyze `file` and pick the anomaly at `--index`
    async fn pick_anomaly(&self, session: &Session, file: &Path) -> anyhow::Result<Anomaly> {
        let path = session.relative(file);
        let anomalies = session.engine.analyze_file(&path).await?;
        match self.index.checked_sub(1).and_then(|i| anomalies.get(i)) {
            Some(anomaly) => Ok(anomaly.clone()),
            None => {
                print_anomalies(&anomalies, false);
                anyhow::bail!("No anomaly #{} in {}", self.index, path.display())
            }
        }
    }
}

/// Print the messages of `conversation` from position `from` onwards
fn print_messages(conversation: &Conversation, from: usize) {
    for message in conversation.messages().iter().skip(from) {
        let speaker = match message.role {
            Role::Assistant => "vigil",
            Role::User => "you",
            Role::System => continue,
        };
        println!("[{}] {}", speaker, message.content);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        chat: ChatArgs,
    }

    #[test]
    fn test_file_or_resume_required() {
        let by_file = Cli::try_parse_from(["vigil", "src/a.rs", "-n", "2"]).unwrap();
        assert_eq!(by_file.chat.file, Some(PathBuf::from("src/a.rs")));
        assert_eq!(by_file.chat.index, 2);

        let resumed = Cli::try_parse_from(["vigil", "--resume", "a1", "-m", "why?"]).unwrap();
        assert_eq!(resumed.chat.resume.as_deref(), Some("a1"));
        assert!(resumed.chat.file.is_none());

        assert!(Cli::try_parse_from(["vigil"]).is_err());
        assert!(Cli::try_parse_from(["vigil", "src/a.rs", "--resume", "a1"]).is_err());
    }
}
