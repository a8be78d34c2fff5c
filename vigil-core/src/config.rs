//! Configuration management for Vigil
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (VIGIL_*)
//! 3. Config file (~/.config/vigil/config.toml)
//! 4. Default values
//!
//! The API key is not part of this file; see [`crate::secrets`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::anomaly::Severity;
use crate::rules::ReviewRule;
use crate::{Error, Result};

/// Default model name
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

/// Model-related configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model name sent with every request
    pub name: String,

    /// OpenAI-compatible chat-completions URL; the public OpenAI endpoint when unset
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Retries for transient failures (rate limits, server errors, timeouts)
    pub max_retries: u32,

    /// Base delay before the first retry, doubled on each attempt
    pub retry_backoff_ms: u64,

    /// Sampling temperature for analysis and fix suggestions
    pub analysis_temperature: f32,

    /// Sampling temperature for conversational replies
    pub chat_temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            endpoint: None,
            request_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
            analysis_temperature: 0.1,
            chat_temperature: 0.7,
        }
    }
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Analysis-related configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Re-analyze a file whenever it is saved
    pub auto_analyze_on_save: bool,

    /// Least severe level still reported
    pub severity_threshold: Severity,

    /// Maximum number of files analyzed by a repository scan
    pub max_files: usize,

    /// Glob patterns excluded from repository scans
    pub exclude: Vec<String>,

    /// Files analyzed at once during a repository scan
    pub scan_concurrency: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            auto_analyze_on_save: false,
            severity_threshold: Severity::Info,
            max_files: 50,
            exclude: vec![
                "**/node_modules/**".to_string(),
                "**/dist/**".to_string(),
                "**/.git/**".to_string(),
            ],
            scan_concurrency: 1,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Model configuration
    pub model: ModelConfig,

    /// Analysis configuration
    pub analysis: AnalysisConfig,

    /// User rules, merged over workspace rules
    pub rules: Vec<ReviewRule>,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Write configuration to a specific file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents).map_err(Error::Io)
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/vigil/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vigil").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - VIGIL_MODEL: Model name
    /// - VIGIL_ENDPOINT: Chat-completions URL
    /// - VIGIL_SEVERITY_THRESHOLD: error, warning or info
    /// - VIGIL_MAX_FILES: Repository scan cap
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(model) = lookup("VIGIL_MODEL") {
            self.model.name = model;
        }

        if let Some(endpoint) = lookup("VIGIL_ENDPOINT") {
            self.model.endpoint = Some(endpoint);
        }

        if let Some(threshold) = lookup("VIGIL_SEVERITY_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.analysis.severity_threshold = threshold;
        }

        if let Some(max_files) = lookup("VIGIL_MAX_FILES").and_then(|v| v.parse().ok()) {
            self.analysis.max_files = max_files;
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, model: Option<String>, endpoint: Option<String>) -> Self {
        if let Some(m) = model {
            self.model.name = m;
        }

        if let Some(e) = endpoint {
            self.model.endpoint = Some(e);
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(model: Option<String>, endpoint: Option<String>) -> Result<Self> {
        Ok(Self::load()?
            .with_env_overrides()
            .with_cli_overrides(model, endpoint))
    }

    /// Read a setting by dotted key, e.g. `analysis.max_files`
    pub fn get_value(&self, key: &str) -> Result<String> {
        let value = match key {
            "model.name" => self.model.name.clone(),
            "model.endpoint" => self.model.endpoint.clone().unwrap_or_default(),
            "model.request_timeout_secs" => self.model.request_timeout_secs.to_string(),
            "model.max_retries" => self.model.max_retries.to_string(),
            "model.retry_backoff_ms" => self.model.retry_backoff_ms.to_string(),
            "model.analysis_temperature" => self.model.analysis_temperature.to_string(),
            "model.chat_temperature" => self.model.chat_temperature.to_string(),
            "analysis.auto_analyze_on_save" => self.analysis.auto_analyze_on_save.to_string(),
            "analysis.severity_threshold" => self.analysis.severity_threshold.to_string(),
            "analysis.max_files" => self.analysis.max_files.to_string(),
            "analysis.exclude" => self.analysis.exclude.join(","),
            "analysis.scan_concurrency" => self.analysis.scan_concurrency.to_string(),
            other => return Err(Error::Config(format!("Unknown setting: {}", other))),
        };
        Ok(value)
    }

    /// Write a setting by dotted key
    ///
    /// Values are parsed into the setting's type; list settings take a
    /// comma-separated string. An empty endpoint clears it.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("Invalid value for {}: {}", key, value)))
        }

        match key {
            "model.name" => self.model.name = value.trim().to_string(),
            "model.endpoint" => {
                let value = value.trim();
                self.model.endpoint = (!value.is_empty()).then(|| value.to_string());
            }
            "model.request_timeout_secs" => self.model.request_timeout_secs = parse(key, value)?,
            "model.max_retries" => self.model.max_retries = parse(key, value)?,
            "model.retry_backoff_ms" => self.model.retry_backoff_ms = parse(key, value)?,
            "model.analysis_temperature" => self.model.analysis_temperature = parse(key, value)?,
            "model.chat_temperature" => self.model.chat_temperature = parse(key, value)?,
            "analysis.auto_analyze_on_save" => {
                self.analysis.auto_analyze_on_save = parse(key, value)?
            }
            "analysis.severity_threshold" => {
                self.analysis.severity_threshold = parse(key, value)?
            }
            "analysis.max_files" => self.analysis.max_files = parse(key, value)?,
            "analysis.exclude" => {
                self.analysis.exclude = value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "analysis.scan_concurrency" => {
                self.analysis.scan_concurrency = parse::<usize>(key, value)?.max(1)
            }
            other => return Err(Error::Config(format!("Unknown setting: {}", other))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "gpt-4-turbo-preview");
        assert!(config.model.endpoint.is_none());
        assert!(!config.analysis.auto_analyze_on_save);
        assert_eq!(config.analysis.severity_threshold, Severity::Info);
        assert_eq!(config.analysis.max_files, 50);
        assert_eq!(
            config.analysis.exclude,
            vec!["**/node_modules/**", "**/dist/**", "**/.git/**"]
        );
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default().with_cli_overrides(
            Some("gpt-4o".to_string()),
            Some("http://localhost:8080/v1/chat/completions".to_string()),
        );

        assert_eq!(config.model.name, "gpt-4o");
        assert_eq!(
            config.model.endpoint.as_deref(),
            Some("http://localhost:8080/v1/chat/completions")
        );
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().with_overrides_from(|name| match name {
            "VIGIL_MODEL" => Some("local-model".to_string()),
            "VIGIL_SEVERITY_THRESHOLD" => Some("warning".to_string()),
            "VIGIL_MAX_FILES" => Some("not a number".to_string()),
            _ => None,
        });

        assert_eq!(config.model.name, "local-model");
        assert_eq!(config.analysis.severity_threshold, Severity::Warning);
        assert_eq!(config.analysis.max_files, 50);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[model]
name = "gpt-4o-mini"
endpoint = "https://example.test/v1/chat/completions"

[analysis]
severity_threshold = "error"
max_files = 10
exclude = ["**/target/**"]

[[rules]]
id = "no-print"
name = "No print"
description = "Avoid print debugging"
severity = "warning"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.model.name, "gpt-4o-mini");
        assert_eq!(config.model.request_timeout_secs, 60);
        assert_eq!(config.analysis.severity_threshold, Severity::Error);
        assert_eq!(config.analysis.max_files, 10);
        assert_eq!(config.analysis.exclude, vec!["**/target/**"]);
        assert_eq!(config.rules.len(), 1);
        assert!(config.rules[0].enabled);
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
[analysis]
auto_analyze_on_save = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.analysis.auto_analyze_on_save);
        assert_eq!(config.model.name, DEFAULT_MODEL);
        assert_eq!(config.analysis.max_files, 50);
    }

    #[test]
    fn test_get_and_set_values() {
        let mut config = Config::default();

        config.set_value("analysis.severity_threshold", "warning").unwrap();
        config.set_value("analysis.exclude", "**/a/**, **/b/**").unwrap();
        config.set_value("model.endpoint", "http://x").unwrap();
        config.set_value("analysis.auto_analyze_on_save", "true").unwrap();

        assert_eq!(config.get_value("analysis.severity_threshold").unwrap(), "warning");
        assert_eq!(config.get_value("analysis.exclude").unwrap(), "**/a/**,**/b/**");
        assert_eq!(config.get_value("model.endpoint").unwrap(), "http://x");
        assert!(config.analysis.auto_analyze_on_save);

        config.set_value("model.endpoint", "").unwrap();
        assert!(config.model.endpoint.is_none());

        assert!(config.set_value("analysis.max_files", "many").is_err());
        assert!(config.set_value("nope", "1").is_err());
        assert!(config.get_value("nope").is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("vigil").join("config.toml");

        let mut config = Config::default();
        config.analysis.max_files = 7;
        config.save_to_file(&path).unwrap();

        let reloaded = Config::load_from_file(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
