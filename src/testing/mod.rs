//! 测试基础设施
//!
//! 提供在不依赖真实 LLM / 外部存储的情况下测试各组件的工具集。
//!
//! | 类型 | 用途 |
//! |------|------|
//! | [`MockLlmClient`] | 替代真实 LLM：预设回复与错误、模拟延迟、记录调用 |
//! | [`FailingHistoryStore`] | 按开关让历史读取 / 用户追加 / 助手追加失败 |
//! | [`FailingSummaryStore`] | 按开关让摘要读取 / 写入失败 |
//! | [`FailingProfileStore`] | 所有资料读取都失败 |
//!
//! # 设计原则
//!
//! - **零网络请求**：所有 Mock 都完全在内存中运行
//! - **可脚本化**：通过 `with_response()` / `with_error()` 精确控制返回值
//! - **可观测**：通过 `call_count()` / `last_messages()` 检查调用情况
//!
//! ```rust,no_run
//! use pet_companion::testing::MockLlmClient;
//! use pet_companion::compression::SummarizationCompactor;
//! use pet_companion::config::ContextConfig;
//! use pet_companion::memory::InMemorySummaryStore;
//! use std::sync::Arc;
//!
//! let mock_llm = Arc::new(MockLlmClient::new().with_response("这是 LLM 生成的摘要内容"));
//! let compactor = SummarizationCompactor::new(
//!     Arc::new(InMemorySummaryStore::new()),
//!     mock_llm.clone(),
//!     &ContextConfig::default(),
//! );
//! # let _ = compactor;
//! ```

mod failing_store;
mod mock_llm;

pub use failing_store::{FailingHistoryStore, FailingProfileStore, FailingSummaryStore};
pub use mock_llm::MockLlmClient;
