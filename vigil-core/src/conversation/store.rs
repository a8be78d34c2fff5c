//! Conversation store
//!
//! One conversation per anomaly, persisted as a single JSON map under
//! [`CONVERSATIONS_KEY`]. Every mutation builds the next map, writes it in
//! full, and only then replaces the in-memory copy, so a failed write leaves
//! the store unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::anomaly::Anomaly;
use crate::locks::KeyedLocks;
use crate::model::ModelClient;
use crate::state::StateStore;
use crate::workspace::Workspace;
use crate::{Error, Result};

use super::types::{AnomalyContext, Conversation, Message};

/// State key holding the serialized conversation map
pub const CONVERSATIONS_KEY: &str = "conversations";

/// Capacity of the update channel
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Notification sent to subscribers after a mutation is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationUpdate {
    Updated(Conversation),
    Deleted { anomaly_id: String },
    Cleared,
}

type ConversationMap = BTreeMap<String, Conversation>;

/// Persistent per-anomaly conversations
pub struct ConversationStore {
    state: Arc<dyn StateStore>,
    client: ModelClient,
    conversations: Mutex<ConversationMap>,
    locks: KeyedLocks,
    updates: broadcast::Sender<ConversationUpdate>,
}

impl ConversationStore {
    /// Load the store from durable state
    pub async fn load(state: Arc<dyn StateStore>, client: ModelClient) -> Result<Self> {
        let conversations: ConversationMap = match state.get(CONVERSATIONS_KEY).await? {
            Some(json) => serde_json::from_str(&json)?,
            None => ConversationMap::new(),
        };
        debug!(count = conversations.len(), "Loaded conversations");

        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Ok(Self {
            state,
            client,
            conversations: Mutex::new(conversations),
            locks: KeyedLocks::new(),
            updates,
        })
    }

    /// Receive a notification after every persisted change
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationUpdate> {
        self.updates.subscribe()
    }

    fn notify(&self, update: ConversationUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }

    async fn persist(&self, map: &ConversationMap) -> Result<()> {
        let json = serde_json::to_string(map)?;
        self.state.put(CONVERSATIONS_KEY, &json).await
    }

    /// Conversation for an anomaly, if one exists
    pub async fn get_conversation(&self, anomaly_id: &str) -> Option<Conversation> {
        self.conversations.lock().await.get(anomaly_id).cloned()
    }

    /// All conversations, most recently updated first
    pub async fn list_conversations(&self) -> Vec<Conversation> {
        let mut all: Vec<Conversation> = self.conversations.lock().await.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all
    }

    /// Most recently updated conversation about the same finding as
    /// `anomaly`, whatever id that finding had when the conversation started
    pub async fn find_for_finding(&self, anomaly: &Anomaly) -> Option<Conversation> {
        self.conversations
            .lock()
            .await
            .values()
            .filter(|c| c.anomaly().is_some_and(|a| a.same_finding(anomaly)))
            .max_by_key(|c| c.updated_at)
            .cloned()
    }

    /// Get or create the conversation for `anomaly`
    ///
    /// A new conversation opens with an assistant message summarizing the
    /// anomaly and is persisted immediately.
    pub async fn start_conversation(&self, anomaly: &Anomaly) -> Result<Conversation> {
        let _guard = self.locks.lock(&anomaly.id).await;

        let mut conversations = self.conversations.lock().await;
        if let Some(existing) = conversations.get(&anomaly.id) {
            return Ok(existing.clone());
        }

        let conversation =
            Conversation::for_anomaly(anomaly, Message::assistant(opening_message(anomaly)));
        let mut next = conversations.clone();
        next.insert(anomaly.id.clone(), conversation.clone());
        self.persist(&next).await?;
        *conversations = next;
        drop(conversations);

        info!(anomaly = %anomaly.id, conversation = %conversation.id(), "Started conversation");
        self.notify(ConversationUpdate::Updated(conversation.clone()));
        Ok(conversation)
    }

    /// Send a user message and append the model's reply
    ///
    /// Sends for the same anomaly are serialized. The user message and reply
    /// are committed together; on any failure the conversation is unchanged.
    pub async fn send_message(
        &self,
        anomaly_id: &str,
        content: &str,
        context: &AnomalyContext,
        cancel: &CancellationToken,
    ) -> Result<Conversation> {
        let _guard = self.locks.lock(anomaly_id).await;

        let mut conversation = self
            .get_conversation(anomaly_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("conversation for anomaly {}", anomaly_id)))?;

        conversation.push(Message::user(content));
        let history = conversation.history();

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            reply = self.client.chat(&history, context) => reply?,
        };
        conversation.push(Message::assistant(reply));

        let mut conversations = self.conversations.lock().await;
        // Deleted while the model was answering
        if !conversations.contains_key(anomaly_id) {
            return Err(Error::NotFound(format!("conversation for anomaly {}", anomaly_id)));
        }
        let mut next = conversations.clone();
        next.insert(anomaly_id.to_string(), conversation.clone());
        self.persist(&next).await?;
        *conversations = next;
        drop(conversations);

        debug!(
            anomaly = %anomaly_id,
            messages = conversation.messages().len(),
            "Conversation updated"
        );
        self.notify(ConversationUpdate::Updated(conversation.clone()));
        Ok(conversation)
    }

    /// Remove one conversation; returns whether it existed
    pub async fn delete_conversation(&self, anomaly_id: &str) -> Result<bool> {
        let _guard = self.locks.lock(anomaly_id).await;

        let mut conversations = self.conversations.lock().await;
        if !conversations.contains_key(anomaly_id) {
            return Ok(false);
        }
        let mut next = conversations.clone();
        next.remove(anomaly_id);
        self.persist(&next).await?;
        *conversations = next;
        drop(conversations);

        info!(anomaly = %anomaly_id, "Deleted conversation");
        self.notify(ConversationUpdate::Deleted {
            anomaly_id: anomaly_id.to_string(),
        });
        Ok(true)
    }

    /// Remove every conversation
    pub async fn clear_all_conversations(&self) -> Result<()> {
        let mut conversations = self.conversations.lock().await;
        self.state.delete(CONVERSATIONS_KEY).await?;
        let count = conversations.len();
        conversations.clear();
        drop(conversations);

        info!(count, "Cleared all conversations");
        self.notify(ConversationUpdate::Cleared);
        Ok(())
    }
}

/// Opening assistant message for a new conversation
fn opening_message(anomaly: &Anomaly) -> String {
    let mut text = format!("**{}**\n\n{}", anomaly.title, anomaly.description);
    if let Some(suggestion) = &anomaly.suggestion {
        text.push_str(&format!("\n\n**Suggestion:** {}", suggestion));
    }
    text.push_str(
        "\n\nAsk me to explain this issue in more detail, or ask for a fix and I will propose one.",
    );
    text
}

/// Project an anomaly into the context used for chat
///
/// The snippet comes from the live document when its lines are still there,
/// and from the anomaly's stored snippet otherwise.
pub async fn build_anomaly_context(anomaly: &Anomaly, workspace: &dyn Workspace) -> AnomalyContext {
    let mut context = AnomalyContext::from_anomaly(anomaly);
    match workspace.read_document(anomaly.file()).await {
        Ok(text) => {
            if let Some(live) = anomaly.location.range.slice(&text) {
                context.snippet = Some(live);
            }
        }
        Err(e) => {
            debug!(file = %anomaly.file().display(), error = %e, "Using stored snippet");
        }
    }
    context
}
