//! CLI command implementations

pub mod analyze;
pub mod bridge;
pub mod chat;
pub mod config;
pub mod conversations;
pub mod fix;
pub mod rules;
pub mod scan;
pub mod session;

pub use analyze::AnalyzeArgs;
pub use bridge::BridgeArgs;
pub use chat::ChatArgs;
pub use config::ConfigArgs;
pub use conversations::ConversationsArgs;
pub use fix::FixArgs;
pub use rules::RulesArgs;
pub use scan::ScanArgs;
pub use session::GlobalArgs;
