pub mod agent;
pub mod compression;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod testing;

pub mod prelude {
    pub use crate::agent::{ChatRequest, ChatResponse, Persona, ReplyOrchestrator};
    pub use crate::compression::SummarizationCompactor;
    pub use crate::config::ContextConfig;
    pub use crate::error::{CompanionError, Result};
    pub use crate::llm::{DefaultLlmClient, LlmClient};
    pub use crate::memory::{ConversationKey, HistoryStore, ProfileStore, SummaryStore};
}
