//! 对话压缩
//!
//! 历史超过阈值后，用 LLM 把窗口之前的轮次折叠成一条滚动摘要，
//! 让注入模型的上下文保持有界，同时保留对话的连续性。
//!
//! | 组件 | 作用 |
//! |------|------|
//! | [`SummarizationCompactor`] | 判断是否需要压缩、调用 LLM 生成摘要并单调写入 |
//! | [`ConcurrencyGuard`] | 按会话的非阻塞互斥，保证同一会话同时只有一次压缩 |
//! | [`SummaryPromptBuilder`] | 摘要提示词策略，默认 [`DefaultSummaryPrompt`] |
//!
//! ```rust,no_run
//! use pet_companion::compression::SummarizationCompactor;
//! use pet_companion::config::ContextConfig;
//! use pet_companion::memory::{ConversationKey, HistoryStore, InMemoryHistoryStore, InMemorySummaryStore};
//! use pet_companion::testing::MockLlmClient;
//! use std::sync::Arc;
//!
//! # async fn example() -> pet_companion::error::Result<()> {
//! let history = InMemoryHistoryStore::new();
//! let compactor = SummarizationCompactor::new(
//!     Arc::new(InMemorySummaryStore::new()),
//!     Arc::new(MockLlmClient::new().with_response("Alice adopted a dragon.")),
//!     &ContextConfig::default(),
//! );
//!
//! let key = ConversationKey::new("alice", "/maps/city");
//! let turns = history.list(&key, None).await?;
//! let resolved = compactor.resolve(&key, &turns).await;
//! println!("{:?}", resolved.outcome);
//! # Ok(())
//! # }
//! ```

mod compactor;
mod guard;
mod prompt;

pub use compactor::{CompactionOutcome, ResolvedSummary, SummarizationCompactor};
pub use guard::{ConcurrencyGuard, GuardLease};
pub use prompt::{DefaultSummaryPrompt, FnSummaryPrompt, SummaryPromptBuilder};
