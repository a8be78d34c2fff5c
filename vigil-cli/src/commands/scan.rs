//! Scan command - review the whole workspace

use clap::Args;
use tokio_util::sync::CancellationToken;
use vigil_core::{ScanProgress, Severity};

use super::session::{print_anomalies, GlobalArgs, Session};

/// Analyze every supported file in the workspace
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Maximum number of files to analyze
    #[arg(long)]
    max_files: Option<usize>,

    /// Files analyzed at the same time
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Least severe level to report (error, warning, info)
    #[arg(long)]
    severity: Option<Severity>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Hide per-file progress
    #[arg(short, long)]
    quiet: bool,
}

impl ScanArgs {
    /// Execute the scan command
    pub async fn execute(&self, global: &GlobalArgs) -> anyhow::Result<()> {
        let mut config = global.config()?;
        if let Some(max_files) = self.max_files {
            config.analysis.max_files = max_files;
        }
        if let Some(concurrency) = self.concurrency {
            config.analysis.scan_concurrency = concurrency.max(1);
        }
        if let Some(severity) = self.severity {
            config.analysis.severity_threshold = severity;
        }

        let session = Session::with_config(global, config)?;
        session.require_configured()?;

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted, stopping scan...");
                on_interrupt.cancel();
            }
        });

        let quiet = self.quiet || self.json;
        let progress = move |p: &ScanProgress| {
            if quiet {
                return;
            }
            let marker = if p.succeeded { "ok" } else { "failed" };
            eprintln!(
                "[{:>3}%] {}/{} {} ({})",
                (p.fraction() * 100.0).round() as u32,
                p.completed,
                p.total,
                p.file.display(),
                marker
            );
        };

        let result = session.engine.analyze_repository(&progress, &cancel).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }

        if result.is_empty() {
            println!("No anomalies found in {} file(s).", result.analyzed_files.len());
            return Ok(());
        }

        print_anomalies(&result.anomalies, global.verbose);
        println!();

        let count = |severity: Severity| {
            result
                .anomalies
                .iter()
                .filter(|a| a.severity == severity)
                .count()
        };
        println!(
            "{} error, {} warning, {} info across {} file(s)",
            count(Severity::Error),
            count(Severity::Warning),
            count(Severity::Info),
            result.analyzed_files.len()
        );
        Ok(())
    }
}
