//! Secrets management for Vigil
//!
//! The model API key is stored separately from configuration to avoid
//! accidental sharing. The secrets file is located at
//! `~/.config/vigil/secrets.toml` and must have restrictive permissions
//! (0600 on Unix).
//!
//! Loading priority:
//! 1. Environment variables (VIGIL_API_KEY, then OPENAI_API_KEY)
//! 2. Secrets file (~/.config/vigil/secrets.toml)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// Environment variables consulted for the API key, in priority order
pub const API_KEY_ENV_VARS: [&str; 2] = ["VIGIL_API_KEY", "OPENAI_API_KEY"];

/// Secrets structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    /// Model API secrets
    pub model: ModelSecrets,
}

/// Model API secrets
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelSecrets {
    /// API key for the chat-completion endpoint
    pub api_key: Option<String>,
}

impl Secrets {
    /// Load secrets from the default location
    ///
    /// Returns default (empty) secrets if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_secrets_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load secrets from a specific file with permission checking
    pub fn load_from_file(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let metadata = std::fs::metadata(path).map_err(Error::Io)?;
            let mode = metadata.permissions().mode();

            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. \
                     Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }

            debug!(path = %path.display(), mode = format!("{:o}", mode & 0o777), "Secrets file permissions OK");
        }

        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut secrets: Secrets = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;

        if let Some(ref mut key) = secrets.model.api_key {
            *key = key.trim().to_string();
        }

        Ok(secrets)
    }

    /// Get the default secrets file path
    ///
    /// Returns `~/.config/vigil/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vigil").join("secrets.toml"))
    }

    /// Get the API key with environment variable override
    pub fn api_key(&self) -> Option<String> {
        self.api_key_with(|name| std::env::var(name).ok())
    }

    /// Resolve the API key using `lookup` for environment variables
    pub fn api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        for name in API_KEY_ENV_VARS {
            if let Some(key) = lookup(name) {
                let key = key.trim().to_string();
                if !key.is_empty() {
                    debug!(source = name, "Using API key from environment");
                    return Some(key);
                }
            }
        }

        match self.model.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {
                debug!("Using API key from secrets file");
                Some(key.to_string())
            }
            _ => None,
        }
    }

    /// Write the API key to `path` with owner-only permissions
    pub fn store_api_key(path: &Path, api_key: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }

        let secrets = Secrets {
            model: ModelSecrets {
                api_key: Some(api_key.trim().to_string()),
            },
        };
        let body = toml::to_string_pretty(&secrets)
            .map_err(|e| Error::Config(format!("Failed to serialize secrets: {}", e)))?;
        let contents = format!(
            "# Vigil Secrets\n# This file contains sensitive credentials - do not share or commit to version control\n\n{}",
            body
        );

        std::fs::write(path, contents).map_err(Error::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms).map_err(Error::Io)?;
        }

        info!(path = %path.display(), "Stored API key");
        Ok(())
    }
}
