//! Analyze command - review individual files

use std::path::PathBuf;

use clap::Args;
use vigil_core::AnalysisResult;

use super::session::{print_anomalies, GlobalArgs, Session};

/// Analyze one or more files
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Files to analyze
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl AnalyzeArgs {
    /// Execute the analyze command
    pub async fn execute(&self, global: &GlobalArgs) -> anyhow::Result<()> {
        let session = Session::open(global)?;
        session.require_configured()?;

        let mut anomalies = Vec::new();
        let mut analyzed = Vec::new();
        let mut failures = 0;

        for file in &self.files {
            let path = session.relative(file);
            match session.engine.analyze_file(&path).await {
                Ok(found) => {
                    anomalies.extend(found);
                    analyzed.push(path);
                }
                Err(e @ vigil_core::Error::NotConfigured) => return Err(e.into()),
                Err(e) => {
                    failures += 1;
                    eprintln!("Failed to analyze {}: {}", path.display(), e);
                }
            }
        }

        let result = AnalysisResult::new(anomalies, analyzed);
        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if result.is_empty() {
            println!("No anomalies found in {} file(s).", result.analyzed_files.len());
        } else {
            print_anomalies(&result.anomalies, global.verbose);
            println!();
            println!(
                "{} anomal{} in {} file(s)",
                result.anomalies.len(),
                if result.anomalies.len() == 1 { "y" } else { "ies" },
                result.analyzed_files.len()
            );
        }

        if failures > 0 {
            anyhow::bail!("{} file(s) could not be analyzed", failures);
        }
        Ok(())
    }
}
