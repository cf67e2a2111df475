pub mod connection;
pub mod debug_log;
pub mod endpoints;
pub mod scripted;

pub use connection::{CompletionClient, CompletionRequest, HttpCompletionClient};
pub use debug_log::{DebugEntry, DebugLog, DebugOutcome};
pub use endpoints::{ModelTier, Prompt, Provider, ProviderKind};
pub use scripted::{ScriptedClient, ScriptedReply};
