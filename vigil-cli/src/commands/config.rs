//! Config command - show and edit configuration

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use vigil_core::{Config, Secrets};

use super::session::GlobalArgs;

/// Show or change configuration
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print one setting, e.g. `analysis.max_files`
    Get { key: String },

    /// Change one setting in the config file
    Set { key: String, value: String },

    /// Store the model API key; read from stdin when omitted
    SetKey { key: Option<String> },
}

impl ConfigArgs {
    /// Execute the config command
    pub async fn execute(&self, global: &GlobalArgs) -> anyhow::Result<()> {
        match self.command.as_ref().unwrap_or(&ConfigCommand::Show) {
            ConfigCommand::Show => show(global),
            ConfigCommand::Get { key } => {
                println!("{}", global.config()?.get_value(key)?);
                Ok(())
            }
            ConfigCommand::Set { key, value } => {
                let path = config_path()?;
                let mut config = if path.exists() {
                    Config::load_from_file(&path)?
                } else {
                    Config::default()
                };
                config.set_value(key, value)?;
                config.save_to_file(&path)?;
                println!("{} = {}", key, config.get_value(key)?);
                Ok(())
            }
            ConfigCommand::SetKey { key } => {
                let key = match key {
                    Some(key) => key.clone(),
                    None => read_key_from_stdin()?,
                };
                if key.trim().is_empty() {
                    anyhow::bail!("API key is empty");
                }
                let path = Secrets::default_secrets_path()
                    .context("Could not determine the config directory")?;
                Secrets::store_api_key(&path, &key)?;
                println!("API key stored in {}", path.display());
                Ok(())
            }
        }
    }
}

fn config_path() -> anyhow::Result<PathBuf> {
    Config::default_config_path().context("Could not determine the config directory")
}

fn read_key_from_stdin() -> anyhow::Result<String> {
    eprintln!("Paste the API key and press enter:");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn show(global: &GlobalArgs) -> anyhow::Result<()> {
    let config = global.config()?;
    let configured = Secrets::load()?.api_key().is_some();

    println!("Vigil Configuration");
    println!("===================");
    println!();
    println!("Model Settings:");
    println!("  name: {}", config.model.name);
    println!(
        "  endpoint: {}",
        config.model.endpoint.as_deref().unwrap_or("(default)")
    );
    println!("  request_timeout_secs: {}", config.model.request_timeout_secs);
    println!("  max_retries: {}", config.model.max_retries);
    println!("  retry_backoff_ms: {}", config.model.retry_backoff_ms);
    println!("  analysis_temperature: {}", config.model.analysis_temperature);
    println!("  chat_temperature: {}", config.model.chat_temperature);
    println!("  api key: {}", if configured { "set" } else { "(not set)" });
    println!();
    println!("Analysis Settings:");
    println!("  auto_analyze_on_save: {}", config.analysis.auto_analyze_on_save);
    println!("  severity_threshold: {}", config.analysis.severity_threshold);
    println!("  max_files: {}", config.analysis.max_files);
    println!("  scan_concurrency: {}", config.analysis.scan_concurrency);
    println!("  exclude: {}", config.analysis.exclude.join(", "));
    println!();
    println!("User rules: {}", config.rules.len());
    println!();
    if let Some(path) = Config::default_config_path() {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
    Ok(())
}
