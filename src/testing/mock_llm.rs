//! 可脚本化的 LLM 替身
//!
//! 回复生成和摘要压缩都只依赖 [`LlmClient`]，测试时把 [`MockLlmClient`] 注入即可：
//! 既能预设每次调用的结果，也能事后检查每次调用收到的消息。
//!
//! ```rust
//! use pet_companion::testing::MockLlmClient;
//! use pet_companion::llm::LlmClient;
//! use pet_companion::llm::types::Message;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mock = MockLlmClient::new().with_response("Woof!");
//! let reply = mock.complete(vec![Message::user("hi".to_string())]).await.unwrap();
//! assert_eq!(reply, "Woof!");
//! assert_eq!(mock.call_count(), 1);
//! # }
//! ```

use crate::error::{CompanionError, LlmError, Result};
use crate::llm::LlmClient;
use crate::llm::types::Message;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct Script {
    outcomes: VecDeque<Result<String>>,
    calls: Vec<Vec<Message>>,
}

/// 按脚本顺序返回结果的 LLM；脚本耗尽后每次调用都返回 `EmptyResponse`。
///
/// 设置 [`with_latency`](MockLlmClient::with_latency) 后每次调用先等待指定时长，
/// 可用来模拟慢速模型、触发超时或在并发测试中占住会话租约。
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<Script>,
    latency: Option<Duration>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(self, outcome: Result<String>) -> Self {
        self.script().outcomes.push_back(outcome);
        self
    }

    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    pub fn with_responses(self, texts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        texts
            .into_iter()
            .fold(self, |mock, text| mock.with_response(text))
    }

    pub fn with_error(self, err: CompanionError) -> Self {
        self.push(Err(err))
    }

    pub fn with_network_error(self, msg: impl Into<String>) -> Self {
        self.with_error(LlmError::NetworkError(msg.into()).into())
    }

    /// 每次调用前等待的时长
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        self.script().calls.len()
    }

    /// 最后一次调用收到的消息
    pub fn last_messages(&self) -> Option<Vec<Message>> {
        self.script().calls.last().cloned()
    }

    pub fn all_calls(&self) -> Vec<Vec<Message>> {
        self.script().calls.clone()
    }

    /// 尚未消费的脚本条数
    pub fn remaining(&self) -> usize {
        self.script().outcomes.len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        // 调用在等待之前就记录下来，超时被取消的调用也能被观察到
        self.script().calls.push(messages);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = self.script().outcomes.pop_front();
        next.unwrap_or_else(|| Err(LlmError::EmptyResponse.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_is_consumed_in_order() {
        let mock = MockLlmClient::new()
            .with_response("ok")
            .with_network_error("reset");

        assert_eq!(mock.complete(vec![]).await.unwrap(), "ok");
        assert!(matches!(
            mock.complete(vec![]).await,
            Err(CompanionError::Llm(LlmError::NetworkError(_)))
        ));
        assert!(matches!(
            mock.complete(vec![]).await,
            Err(CompanionError::Llm(LlmError::EmptyResponse))
        ));
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.remaining(), 0);
    }

    #[tokio::test]
    async fn test_records_messages() {
        let mock = MockLlmClient::new().with_responses(["a", "b"]);
        mock.complete(vec![Message::user("first".to_string())])
            .await
            .unwrap();
        mock.complete(vec![Message::user("second".to_string())])
            .await
            .unwrap();

        let calls = mock.all_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][0].text(), "first");
        assert_eq!(mock.last_messages().unwrap()[0].text(), "second");
    }

    #[tokio::test]
    async fn test_latency_is_observable_by_timeout() {
        let mock = MockLlmClient::new()
            .with_response("late")
            .with_latency(Duration::from_millis(200));

        let outcome =
            tokio::time::timeout(Duration::from_millis(10), mock.complete(vec![])).await;
        assert!(outcome.is_err());
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.remaining(), 1);
    }
}
