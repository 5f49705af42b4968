mod client;
pub mod config;
pub mod types;

use crate::error::{LlmError, Result};
use crate::llm::config::ModelConfig;
use crate::llm::types::{ChatCompletionRequest, Message};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

/// 文本补全能力：回复生成和摘要压缩都只依赖这个接口
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 发起一次无工具对话，返回模型的文本内容
    async fn complete(&self, messages: Vec<Message>) -> Result<String>;
}

/// 基于 OpenAI 兼容 HTTP 接口的默认实现
pub struct DefaultLlmClient {
    client: Arc<Client>,
    model: ModelConfig,
    temperature: f32,
    max_tokens: u32,
}

impl DefaultLlmClient {
    pub fn new(client: Arc<Client>, model: ModelConfig) -> Self {
        Self {
            client,
            model,
            temperature: 0.7,
            max_tokens: 512,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl LlmClient for DefaultLlmClient {
    async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        let body = ChatCompletionRequest {
            model: self.model.model.clone(),
            messages,
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            stream: Some(false),
        };
        client::send_completion(&self.client, &self.model, &body)
            .await?
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyResponse.into())
    }
}
