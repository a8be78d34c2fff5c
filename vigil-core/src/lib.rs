//! Vigil Core - model-assisted code review
//!
//! This crate sends source files to a chat-completion model, turns the
//! structured answer into anomalies, caches them per file, and keeps one
//! conversation per anomaly whose history is replayed on follow-up questions.
//! The [`bridge`] module connects all of it to a detached UI and the editor.

pub mod analysis;
pub mod anomaly;
pub mod bridge;
pub mod config;
pub mod conversation;
pub mod error;
pub mod locks;
pub mod model;
pub mod rules;
pub mod secrets;
pub mod state;
pub mod workspace;

pub use analysis::{AnalysisEngine, ProgressSink, ScanProgress};
pub use anomaly::{AnalysisResult, Anomaly, AnomalyType, CodeFix, FileEdit, LineRange, Location, Severity};
pub use bridge::{Bridge, EditorSurface, UiCommand, UiEvent};
pub use config::Config;
pub use conversation::{AnomalyContext, Conversation, ConversationStore, Message, Role};
pub use error::{Error, Result};
pub use model::ModelClient;
pub use rules::{ReviewRule, RuleSet};
pub use secrets::Secrets;
pub use state::{MemoryStateStore, StateStore};
pub use workspace::{FsWorkspace, Workspace};
