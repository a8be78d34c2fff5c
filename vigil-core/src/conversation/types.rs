//! Conversation data types

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::anomaly::{Anomaly, AnomalyType};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// The dialogue attached to exactly one anomaly
///
/// Messages are append-only and the owning anomaly id never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    id: String,
    anomaly_id: String,
    messages: Vec<Message>,
    /// The anomaly as it was when the conversation started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anomaly: Option<Anomaly>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Start a conversation with an opening message
    pub fn new(anomaly_id: impl Into<String>, opening: Message) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            anomaly_id: anomaly_id.into(),
            messages: vec![opening],
            anomaly: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Start a conversation that keeps a snapshot of `anomaly`
    pub fn for_anomaly(anomaly: &Anomaly, opening: Message) -> Self {
        Self {
            anomaly: Some(anomaly.clone()),
            ..Self::new(&anomaly.id, opening)
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn anomaly_id(&self) -> &str {
        &self.anomaly_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Snapshot of the anomaly; absent for conversations stored without one
    pub fn anomaly(&self) -> Option<&Anomaly> {
        self.anomaly.as_ref()
    }

    /// Append a message and bump `updated_at`
    pub fn push(&mut self, message: Message) {
        self.updated_at = message.timestamp.max(self.updated_at);
        self.messages.push(message);
    }

    /// Messages replayed to the model: everything except system entries
    pub fn history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()
    }
}

/// Anomaly details embedded into the chat system prompt
///
/// Line numbers are 1-indexed for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyContext {
    pub file: PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    pub language: String,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl AnomalyContext {
    /// Project an anomaly without live document text
    pub fn from_anomaly(anomaly: &Anomaly) -> Self {
        Self {
            file: anomaly.location.file.clone(),
            start_line: anomaly.location.range.display_start(),
            end_line: anomaly.location.range.display_end(),
            language: crate::workspace::language_for_path(&anomaly.location.file).to_string(),
            anomaly_type: anomaly.anomaly_type,
            title: anomaly.title.clone(),
            description: anomaly.description.clone(),
            snippet: anomaly.location.snippet.clone(),
        }
    }
}
