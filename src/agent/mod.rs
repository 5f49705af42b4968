//! 宠物对话编排
//!
//! [`ReplyOrchestrator`] 把存储、摘要压缩和 LLM 串成一次完整的回复流程；
//! [`ContextLayers`] 负责把解析好的各层组装成发给模型的消息列表。

use crate::error::{CompanionError, ErrorCategory};
use serde::{Deserialize, Serialize};

pub mod assembler;
pub mod orchestrator;
pub mod persona;

pub use assembler::ContextLayers;
pub use orchestrator::{DEFAULT_FALLBACK_REPLY, ReplyOrchestrator, ReplyOrchestratorBuilder};
pub use persona::{LocationCatalog, Persona};

/// 一次对话请求，字段名与前端提交的 JSON 一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: String,
    /// 会话 id，当前取页面路径
    #[serde(default)]
    pub conversation_key: String,
    #[serde(default)]
    pub user_id: String,
}

impl ChatRequest {
    pub fn new(
        prompt: impl Into<String>,
        conversation_key: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            conversation_key: conversation_key.into(),
            user_id: user_id.into(),
        }
    }
}

/// 对外的响应：成功时 `{"reply": ...}`，失败时 `{"error": ..., "category": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Reply { reply: String },
    Error { error: String, category: ErrorCategory },
}

impl ChatResponse {
    pub fn from_error(err: &CompanionError) -> Self {
        ChatResponse::Error {
            error: err.to_string(),
            category: err.category(),
        }
    }
}
