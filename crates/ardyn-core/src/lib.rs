pub mod ai;
pub mod config;
pub mod state;
pub mod transcript;

// Re-export main types for convenience
pub use ai::{CompletionClient, CompletionConfig, CompletionError};
pub use config::Config;
pub use state::{ChatMessage, ChatRole, ConversationState};
pub use transcript::Transcript;
