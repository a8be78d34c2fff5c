//! Per-anomaly conversations

pub mod store;
pub mod types;

pub use store::{build_anomaly_context, ConversationStore, ConversationUpdate, CONVERSATIONS_KEY};
pub use types::{AnomalyContext, Conversation, Message, Role};
