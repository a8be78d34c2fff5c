//! Model client
//!
//! Three operations against a chat-completion backend: file analysis,
//! conversational chat, and fix suggestion. Every failure is propagated as a
//! typed error; callers decide whether to swallow it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::anomaly::{Anomaly, CodeFix};
use crate::config::ModelConfig;
use crate::conversation::{AnomalyContext, Message};
use crate::rules::ReviewRule;
use crate::{Error, Result};

use super::backend::{ChatBackend, ChatMessage, ChatRequest, HttpBackend};
use super::{parse, prompts};

/// Exponential backoff factor between retries
const BACKOFF_MULTIPLIER: u32 = 2;

/// A file imported by the analyzed file, included as context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedFile {
    pub path: PathBuf,
    pub content: String,
}

/// Input to [`ModelClient::analyze`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisContext {
    pub file_name: PathBuf,
    pub language: String,
    pub file_content: String,
    pub related_files: Vec<RelatedFile>,
}

/// Client for the remote chat-completion model
#[derive(Clone)]
pub struct ModelClient {
    backend: Arc<dyn ChatBackend>,
    config: ModelConfig,
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("backend", &self.backend.name())
            .field("model", &self.config.name)
            .finish()
    }
}

impl ModelClient {
    pub fn new(backend: Arc<dyn ChatBackend>, config: ModelConfig) -> Self {
        Self { backend, config }
    }

    /// Create a client talking to the configured HTTP endpoint
    pub fn from_config(config: ModelConfig, api_key: Option<String>) -> Result<Self> {
        let backend = HttpBackend::new(&config, api_key)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    /// Whether a credential is available
    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    pub fn model(&self) -> &str {
        &self.config.name
    }

    /// Analyze one file and return its anomalies
    pub async fn analyze(
        &self,
        context: &AnalysisContext,
        rules: &[&ReviewRule],
    ) -> Result<Vec<Anomaly>> {
        self.ensure_configured()?;

        let system = prompts::analysis_system_prompt(rules);
        let user = prompts::analysis_user_prompt(context);
        debug!(
            file = %context.file_name.display(),
            rules = rules.len(),
            related = context.related_files.len(),
            prompt_chars = system.len() + user.len(),
            "Built analysis prompt"
        );

        let request = ChatRequest {
            model: self.config.name.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: self.config.analysis_temperature,
            json_response: true,
        };

        let response = self.send(&request).await?;
        parse::parse_anomalies(&response, &context.file_name, &context.file_content)
    }

    /// Continue a conversation about one anomaly
    ///
    /// System entries in `history` are dropped and replaced by a fresh system
    /// prompt built from `context`.
    pub async fn chat(&self, history: &[Message], context: &AnomalyContext) -> Result<String> {
        self.ensure_configured()?;

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(prompts::chat_system_prompt(context)));
        messages.extend(
            history
                .iter()
                .filter(|m| m.role != crate::conversation::Role::System)
                .map(|m| ChatMessage::new(m.role, m.content.clone())),
        );

        let request = ChatRequest {
            model: self.config.name.clone(),
            messages,
            temperature: self.config.chat_temperature,
            json_response: false,
        };

        let content = self.send(&request).await?;
        if content.trim().is_empty() {
            return Err(Error::Parse("empty chat response".to_string()));
        }
        Ok(content)
    }

    /// Ask for a minimal fix of the anomaly's range
    ///
    /// `Ok(None)` means the model found no safe fix.
    pub async fn suggest_fix(&self, anomaly: &Anomaly, file_content: &str) -> Result<Option<CodeFix>> {
        self.ensure_configured()?;

        let (system, user) = prompts::fix_prompts(anomaly, file_content);
        let request = ChatRequest {
            model: self.config.name.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: self.config.analysis_temperature,
            json_response: true,
        };

        let response = self.send(&request).await?;
        let fix = parse::parse_fix(&response, anomaly, file_content)?;
        info!(
            anomaly = %anomaly.id,
            edits = fix.as_ref().map_or(0, |f| f.edits.len()),
            "Fix suggestion received"
        );
        Ok(fix)
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.backend.is_configured() {
            Ok(())
        } else {
            Err(Error::NotConfigured)
        }
    }

    /// Send a request, retrying transient failures with exponential backoff
    async fn send(&self, request: &ChatRequest) -> Result<String> {
        let mut retry_count = 0u32;
        loop {
            match self.backend.complete(request).await {
                Ok(content) => return Ok(content),
                Err(err) if err.is_transient() && retry_count < self.config.max_retries => {
                    retry_count += 1;
                    let delay = backoff(self.config.retry_backoff(), retry_count);
                    warn!(
                        backend = self.backend.name(),
                        attempt = retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient model error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Delay before retry number `retry_count` (1-based)
fn backoff(base: Duration, retry_count: u32) -> Duration {
    base.saturating_mul(BACKOFF_MULTIPLIER.saturating_pow(retry_count.saturating_sub(1)))
}
