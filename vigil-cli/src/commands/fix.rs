//! Fix command - ask the model for a fix and apply it

use std::path::PathBuf;

use clap::Args;
use vigil_core::Workspace;

use super::session::{print_anomalies, GlobalArgs, Session};

/// Generate a fix for one anomaly of a file
#[derive(Args, Debug)]
pub struct FixArgs {
    /// File to analyze
    file: PathBuf,

    /// 1-based position of the anomaly in the analysis output
    #[arg(short = 'n', long, default_value_t = 1)]
    index: usize,

    /// Print the patched file instead of writing it
    #[arg(long)]
    dry_run: bool,
}

impl FixArgs {
    /// Execute the fix command
    pub async fn execute(&self, global: &GlobalArgs) -> anyhow::Result<()> {
        let session = Session::open(global)?;
        session.require_configured()?;

        let path = session.relative(&self.file);
        let anomalies = session.engine.analyze_file(&path).await?;
        if anomalies.is_empty() {
            println!("No anomalies found in {}.", path.display());
            return Ok(());
        }

        let Some(anomaly) = self
            .index
            .checked_sub(1)
            .and_then(|i| anomalies.get(i))
        else {
            print_anomalies(&anomalies, false);
            anyhow::bail!(
                "No anomaly #{} in {}; pick one of 1-{}",
                self.index,
                path.display(),
                anomalies.len()
            );
        };

        println!("Fixing: {}", anomaly);
        let workspace = session.engine.workspace();
        let content = workspace.read_document(&path).await?;

        let Some(fix) = session.engine.client().suggest_fix(anomaly, &content).await? else {
            println!("The model did not propose any edits.");
            return Ok(());
        };

        let patched = fix.apply_to(&path, &content);
        if self.dry_run {
            print!("{}", patched);
            return Ok(());
        }

        workspace.write_document(&path, &patched).await?;
        println!("{}", fix.description);
        println!("Applied {} edit(s) to {}", fix.edits.len(), path.display());
        Ok(())
    }
}
