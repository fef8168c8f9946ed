pub mod error;
pub mod openai;

pub use error::CompletionError;
pub use openai::{CompletionClient, CompletionConfig};
