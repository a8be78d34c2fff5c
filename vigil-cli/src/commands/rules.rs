//! Rules command - show the merged review rules

use clap::Args;
use vigil_core::rules::workspace_rules_path;
use vigil_core::RuleSet;

use super::session::GlobalArgs;

/// List the review rules in effect for the workspace
#[derive(Args, Debug)]
pub struct RulesArgs {
    /// Include disabled rules
    #[arg(short, long)]
    all: bool,

    /// Only rules applying to this language
    #[arg(short, long)]
    language: Option<String>,
}

impl RulesArgs {
    /// Execute the rules command
    pub async fn execute(&self, global: &GlobalArgs) -> anyhow::Result<()> {
        let config = global.config()?;
        let root = global.root()?;
        let rules = RuleSet::load(&root, &config.rules)?;

        let shown: Vec<_> = rules
            .all()
            .iter()
            .filter(|r| self.all || r.enabled)
            .filter(|r| self.language.as_deref().is_none_or(|l| r.applies_to(l)))
            .collect();

        if shown.is_empty() {
            println!("No rules match.");
        }
        for rule in shown {
            let state = if rule.enabled { "" } else { " (disabled)" };
            println!("{:<24} {:<8} {}{}", rule.id, rule.severity.as_str(), rule.name, state);
            if global.verbose {
                println!("    {}", rule.instruction());
                if let Some(languages) = &rule.languages {
                    println!("    languages: {}", languages.join(", "));
                }
            }
        }

        let path = workspace_rules_path(&root);
        println!();
        println!(
            "Workspace rules: {}{}",
            path.display(),
            if path.exists() { "" } else { " (not found)" }
        );
        Ok(())
    }
}
