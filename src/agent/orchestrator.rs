use crate::agent::assembler::ContextLayers;
use crate::agent::persona::{LocationCatalog, Persona};
use crate::agent::{ChatRequest, ChatResponse};
use crate::compression::{ConcurrencyGuard, SummarizationCompactor};
use crate::config::ContextConfig;
use crate::error::{CompanionError, ConfigError, LlmError, Result, ValidationError};
use crate::llm::LlmClient;
use crate::llm::types::Message;
use crate::memory::{
    ConversationKey, HistoryStore, ProfileStore, Role, Summary, SummaryStore, Turn,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, info, info_span, warn};

/// 生成失败时返回给用户的固定回复
pub const DEFAULT_FALLBACK_REPLY: &str = "Sorry, I couldn't think of a reply just now.";

/// 最近 `window` 条序号大于切点的轮次
pub(crate) fn select_window(history: &[Turn], cutpoint: Option<u64>, window: usize) -> &[Turn] {
    let start = history.partition_point(|t| t.sequence <= cutpoint.unwrap_or(0));
    let tail = &history[start..];
    &tail[tail.len().saturating_sub(window)..]
}

/// 校验通过的请求
struct Validated<'a> {
    key: ConversationKey,
    prompt: &'a str,
}

fn validate(request: &ChatRequest) -> Result<Validated<'_>> {
    fn present<'r>(value: &'r str, field: &'static str) -> Result<&'r str> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField(field).into());
        }
        Ok(trimmed)
    }

    let prompt = present(&request.prompt, "prompt")?;
    let conversation_id = present(&request.conversation_key, "conversationKey")?;
    let user_id = present(&request.user_id, "userId")?;
    Ok(Validated {
        key: ConversationKey::new(user_id, conversation_id),
        prompt,
    })
}

/// 端到端处理一次对话请求。
///
/// 每个请求严格按以下顺序执行，组装上下文之前所有层都已解析完毕：
///
/// 1. 校验请求字段（任何 IO 之前）
/// 2. 读取会话历史（失败时按空历史降级）
/// 3. 通过 [`SummarizationCompactor`] 解析摘要（可能触发一次压缩）
/// 4. 读取用户资料（失败或不存在时省略该层）
/// 5. 计算窗口：切点之后最近 `window` 条
/// 6. 组装上下文
/// 7. 持久化用户轮次（失败时直接返回错误）
/// 8. 调用 LLM 生成回复
/// 9. 成功：持久化助手轮次并返回回复
/// 10. 失败：返回固定兜底回复，不写助手轮次
///
/// 所有依赖都在构造时显式传入，不存在进程级共享的客户端。
pub struct ReplyOrchestrator {
    history: Arc<dyn HistoryStore>,
    summaries: Arc<dyn SummaryStore>,
    profiles: Arc<dyn ProfileStore>,
    compactor: SummarizationCompactor,
    generator: Arc<dyn LlmClient>,
    persona: Persona,
    locations: LocationCatalog,
    window: usize,
    generation_timeout: Duration,
    fallback_reply: String,
}

impl ReplyOrchestrator {
    pub fn builder(config: ContextConfig) -> ReplyOrchestratorBuilder {
        ReplyOrchestratorBuilder {
            config,
            history: None,
            summaries: None,
            profiles: None,
            generator: None,
            summarizer: None,
            guard: None,
            persona: Persona::default(),
            locations: LocationCatalog::default(),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn locations(&self) -> &LocationCatalog {
        &self.locations
    }

    /// 处理请求并转换为对外的响应结构
    pub async fn handle(&self, request: &ChatRequest) -> ChatResponse {
        match self.reply(request).await {
            Ok(reply) => ChatResponse::Reply { reply },
            Err(e) => ChatResponse::from_error(&e),
        }
    }

    /// 带调用方身份的入口：身份为空或与请求中的 `userId` 不一致时，在任何 IO 之前拒绝
    pub async fn handle_as(&self, caller_user_id: &str, request: &ChatRequest) -> ChatResponse {
        let caller = caller_user_id.trim();
        if caller.is_empty() {
            return ChatResponse::from_error(&CompanionError::Auth(
                "unauthenticated caller".to_string(),
            ));
        }
        if caller != request.user_id.trim() {
            return ChatResponse::from_error(&CompanionError::Auth(
                "caller may not write to another user's conversation".to_string(),
            ));
        }
        self.handle(request).await
    }

    /// 生成一次回复。
    ///
    /// 只有请求校验失败和用户轮次写入失败会返回 `Err`；
    /// 生成失败时返回 `Ok(兜底回复)`。
    pub async fn reply(&self, request: &ChatRequest) -> Result<String> {
        let validated = validate(request)?;
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!(
            "reply",
            %request_id,
            user = %validated.key.user_id,
            conversation = %validated.key.conversation_id
        );
        self.reply_validated(validated).instrument(span).await
    }

    async fn reply_validated(&self, request: Validated<'_>) -> Result<String> {
        let key = request.key;

        let epoch = self.compactor.epoch(&key);
        let history = match self.history.list(&key, None).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(phase = "history", error = %e, "历史读取失败，按空历史继续");
                Vec::new()
            }
        };

        let resolved = self.compactor.resolve_at(&key, &history, epoch).await;
        let summary = resolved.summary;
        debug!(
            phase = "summary",
            outcome = ?resolved.outcome,
            cutpoint = summary.as_ref().map(|s| s.cutpoint_sequence),
            "摘要已解析"
        );

        let profile_text = match self.profiles.get(&key.user_id).await {
            Ok(profile) => profile.and_then(|p| p.render()),
            Err(e) => {
                warn!(phase = "profile", error = %e, "用户资料读取失败，省略资料层");
                None
            }
        };

        let window = select_window(
            &history,
            summary.as_ref().map(|s| s.cutpoint_sequence),
            self.window,
        );
        let persona_text = self.persona.text();
        let location_text = self.locations.location_text(&key.conversation_id);
        let messages = ContextLayers::new(&persona_text, request.prompt)
            .location(location_text.as_deref())
            .profile(profile_text.as_deref())
            .summary(summary.as_ref().map(|s| s.text.as_str()))
            .window(window)
            .assemble();

        let user_turn = self
            .history
            .append(&key, Role::User, request.prompt)
            .await
            .inspect_err(|e| warn!(phase = "append_user", error = %e, "用户轮次写入失败"))?;

        match self.generate(messages).await {
            Ok(reply) => {
                self.persist_reply(key, reply.clone()).await;
                info!(
                    user_sequence = user_turn.sequence,
                    window = window.len(),
                    "💬 回复完成"
                );
                Ok(reply)
            }
            Err(e) => {
                warn!(phase = "generate", error = %e, "回复生成失败，返回兜底回复");
                Ok(self.fallback_reply.clone())
            }
        }
    }

    async fn generate(&self, messages: Vec<Message>) -> Result<String> {
        let reply = tokio::time::timeout(self.generation_timeout, self.generator.complete(messages))
            .await
            .map_err(|_| LlmError::Timeout(self.generation_timeout.as_millis() as u64))??;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(LlmError::EmptyResponse.into());
        }
        Ok(reply.to_string())
    }

    /// 在独立任务里写入助手轮次，调用方中途放弃也不会打断这次写入
    async fn persist_reply(&self, key: ConversationKey, reply: String) {
        let history = self.history.clone();
        let handle = tokio::spawn(
            async move { history.append(&key, Role::Assistant, &reply).await }
                .in_current_span(),
        );
        match handle.await {
            Ok(Ok(turn)) => debug!(phase = "append_assistant", sequence = turn.sequence, "助手轮次已写入"),
            Ok(Err(e)) => warn!(phase = "append_assistant", error = %e, "助手轮次写入失败"),
            Err(e) => warn!(phase = "append_assistant", error = %e, "助手轮次写入任务异常"),
        }
    }

    /// 会话当前的摘要
    pub async fn current_summary(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Summary>> {
        self.summaries
            .get(&ConversationKey::new(user_id, conversation_id))
            .await
    }

    /// 重置整个会话：清空历史并删除摘要。
    ///
    /// 先等待进行中的压缩结束并持有会话租约，再让此前读取的历史快照失效，
    /// 旧会话的摘要因此不会在重置之后被写回。
    pub async fn reset(&self, user_id: &str, conversation_id: &str) -> Result<()> {
        let key = ConversationKey::new(user_id, conversation_id);
        let lease = self.compactor.concurrency_guard().acquire(&key).await;
        lease.invalidate();
        self.history.clear(&key).await?;
        self.summaries.delete(&key).await?;
        info!(conversation = %key, "🔄 会话已重置");
        Ok(())
    }
}

/// `ReplyOrchestrator` 的构建器
pub struct ReplyOrchestratorBuilder {
    config: ContextConfig,
    history: Option<Arc<dyn HistoryStore>>,
    summaries: Option<Arc<dyn SummaryStore>>,
    profiles: Option<Arc<dyn ProfileStore>>,
    generator: Option<Arc<dyn LlmClient>>,
    summarizer: Option<Arc<dyn LlmClient>>,
    guard: Option<ConcurrencyGuard>,
    persona: Persona,
    locations: LocationCatalog,
    fallback_reply: String,
}

impl ReplyOrchestratorBuilder {
    pub fn history(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn summaries(mut self, store: Arc<dyn SummaryStore>) -> Self {
        self.summaries = Some(store);
        self
    }

    pub fn profiles(mut self, store: Arc<dyn ProfileStore>) -> Self {
        self.profiles = Some(store);
        self
    }

    /// 生成回复用的 LLM
    pub fn generator(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.generator = Some(llm);
        self
    }

    /// 生成摘要用的 LLM（未设置时与 `generator` 相同）
    pub fn summarizer(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.summarizer = Some(llm);
        self
    }

    /// 多个编排器服务同一批会话时共享的压缩互斥
    pub fn guard(mut self, guard: ConcurrencyGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn locations(mut self, locations: LocationCatalog) -> Self {
        self.locations = locations;
        self
    }

    pub fn fallback_reply(mut self, reply: impl Into<String>) -> Self {
        self.fallback_reply = reply.into();
        self
    }

    pub fn build(self) -> Result<ReplyOrchestrator> {
        self.config.validate()?;
        let missing = |field: &str| CompanionError::from(ConfigError::MissingField(field.to_string()));
        let history = self.history.ok_or_else(|| missing("history"))?;
        let summaries = self.summaries.ok_or_else(|| missing("summaries"))?;
        let profiles = self.profiles.ok_or_else(|| missing("profiles"))?;
        let generator = self.generator.ok_or_else(|| missing("generator"))?;
        let summarizer = self.summarizer.unwrap_or_else(|| generator.clone());

        let mut compactor = SummarizationCompactor::new(summaries.clone(), summarizer, &self.config);
        if let Some(guard) = self.guard {
            compactor = compactor.guard(guard);
        }

        Ok(ReplyOrchestrator {
            history,
            summaries,
            profiles,
            compactor,
            generator,
            persona: self.persona,
            locations: self.locations,
            window: self.config.window,
            generation_timeout: self.config.generation_timeout(),
            fallback_reply: self.fallback_reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::memory::{InMemoryHistoryStore, InMemoryProfileStore, InMemorySummaryStore, ProfileContext};
    use crate::testing::{
        FailingHistoryStore, FailingProfileStore, FailingSummaryStore, MockLlmClient,
    };

    const USER: &str = "alice";
    const PAGE: &str = "/my-pets";

    fn request(prompt: &str) -> ChatRequest {
        ChatRequest::new(prompt, PAGE, USER)
    }

    fn key() -> ConversationKey {
        ConversationKey::new(USER, PAGE)
    }

    async fn seed(history: &dyn HistoryStore, key: &ConversationKey, n: usize) {
        for i in 1..=n {
            let role = if i % 2 == 1 { Role::User } else { Role::Assistant };
            history.append(key, role, &format!("turn {i}")).await.unwrap();
        }
    }

    struct Harness {
        history: Arc<InMemoryHistoryStore>,
        summaries: Arc<InMemorySummaryStore>,
        generator: Arc<MockLlmClient>,
        summarizer: Arc<MockLlmClient>,
        orchestrator: ReplyOrchestrator,
    }

    fn harness(generator: MockLlmClient, summarizer: MockLlmClient) -> Harness {
        harness_with(ContextConfig::default(), generator, summarizer)
    }

    fn harness_with(config: ContextConfig, generator: MockLlmClient, summarizer: MockLlmClient) -> Harness {
        let history = Arc::new(InMemoryHistoryStore::new());
        let summaries = Arc::new(InMemorySummaryStore::new());
        let generator = Arc::new(generator);
        let summarizer = Arc::new(summarizer);
        let orchestrator = ReplyOrchestrator::builder(config)
            .history(history.clone())
            .summaries(summaries.clone())
            .profiles(Arc::new(InMemoryProfileStore::new()))
            .generator(generator.clone())
            .summarizer(summarizer.clone())
            .build()
            .unwrap();
        Harness {
            history,
            summaries,
            generator,
            summarizer,
            orchestrator,
        }
    }

    #[test]
    fn test_select_window() {
        let turns: Vec<Turn> = (1..=25)
            .map(|i| Turn {
                role: Role::User,
                text: format!("turn {i}"),
                sequence: i,
                created_at: 0,
            })
            .collect();

        let window = select_window(&turns, Some(15), 10);
        assert_eq!(window.first().unwrap().sequence, 16);
        assert_eq!(window.last().unwrap().sequence, 25);

        let window = select_window(&turns, None, 10);
        assert_eq!(window.len(), 10);
        assert_eq!(window[0].sequence, 16);

        // 切点之后不足一个窗口时只取切点之后的部分
        let window = select_window(&turns, Some(20), 10);
        assert_eq!(window.len(), 5);
        assert_eq!(window[0].sequence, 21);

        assert!(select_window(&[], Some(3), 10).is_empty());
    }

    #[tokio::test]
    async fn test_first_message_on_empty_history() {
        let h = harness(MockLlmClient::new().with_response("Hello, friend!"), MockLlmClient::new());

        let reply = h.orchestrator.reply(&request("hi")).await.unwrap();
        assert_eq!(reply, "Hello, friend!");

        let messages = h.generator.last_messages().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].text(), h.orchestrator.persona().text());
        assert_eq!(messages[1], Message::user("hi".to_string()));

        let turns = h.history.list(&key(), None).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!((turns[0].role, turns[0].sequence), (Role::User, 1));
        assert_eq!((turns[1].role, turns[1].sequence), (Role::Assistant, 2));
        assert_eq!(turns[1].text, "Hello, friend!");
        assert_eq!(h.summarizer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_compaction_then_window_after_cutpoint() {
        let h = harness(
            MockLlmClient::new().with_response("Sure!"),
            MockLlmClient::new().with_response("Alice told Pip about her day."),
        );
        seed(h.history.as_ref(), &key(), 25).await;

        h.orchestrator.reply(&request("what next?")).await.unwrap();

        let summary = h.summaries.get(&key()).await.unwrap().unwrap();
        assert_eq!(summary.cutpoint_sequence, 15);

        let messages = h.generator.last_messages().unwrap();
        // persona + summary + 10 条窗口 + 新消息
        assert_eq!(messages.len(), 13);
        assert_eq!(
            messages[1].text(),
            "Summary of your earlier conversation: Alice told Pip about her day."
        );
        assert_eq!(messages[2].text(), "turn 16");
        assert_eq!(messages[11].text(), "turn 25");
        assert_eq!(messages[12], Message::user("what next?".to_string()));
        assert!(messages.iter().all(|m| m.text() != "turn 15"));
    }

    #[tokio::test]
    async fn test_generation_failure_returns_fallback() {
        let h = harness(MockLlmClient::new().with_network_error("connection reset"), MockLlmClient::new());

        let reply = h.orchestrator.reply(&request("hi")).await.unwrap();
        assert_eq!(reply, DEFAULT_FALLBACK_REPLY);

        let turns = h.history.list(&key(), None).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_generation_timeout_returns_fallback() {
        let config = ContextConfig::default().generation_timeout_ms(20);
        let h = harness_with(
            config,
            MockLlmClient::new()
                .with_response("too late")
                .with_latency(Duration::from_millis(200)),
            MockLlmClient::new(),
        );

        let reply = h.orchestrator.reply(&request("hi")).await.unwrap();
        assert_eq!(reply, DEFAULT_FALLBACK_REPLY);
        assert_eq!(h.history.list(&key(), None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_generation_returns_fallback() {
        let h = harness(MockLlmClient::new().with_response("   "), MockLlmClient::new());
        let reply = h.orchestrator.reply(&request("hi")).await.unwrap();
        assert_eq!(reply, DEFAULT_FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_custom_fallback_reply() {
        let orchestrator = ReplyOrchestrator::builder(ContextConfig::default())
            .history(Arc::new(InMemoryHistoryStore::new()))
            .summaries(Arc::new(InMemorySummaryStore::new()))
            .profiles(Arc::new(InMemoryProfileStore::new()))
            .generator(Arc::new(MockLlmClient::new()))
            .fallback_reply("*yawns*")
            .build()
            .unwrap();
        assert_eq!(orchestrator.reply(&request("hi")).await.unwrap(), "*yawns*");
    }

    #[tokio::test]
    async fn test_concurrent_requests_compact_once() {
        let h = harness(
            MockLlmClient::new().with_responses(["first", "second"]),
            MockLlmClient::new()
                .with_response("folded")
                .with_latency(Duration::from_millis(50)),
        );
        seed(h.history.as_ref(), &key(), 25).await;

        let first = request("one");
        let second = request("two");
        let (a, b) = tokio::join!(h.orchestrator.reply(&first), h.orchestrator.reply(&second));

        assert_ne!(a.unwrap(), DEFAULT_FALLBACK_REPLY);
        assert_ne!(b.unwrap(), DEFAULT_FALLBACK_REPLY);
        assert_eq!(h.summarizer.call_count(), 1);
        assert_eq!(h.generator.call_count(), 2);

        // 没拿到租约的请求在没有摘要的情况下组装：persona + 10 条窗口 + 新消息
        let calls = h.generator.all_calls();
        assert!(calls.iter().any(|messages| messages.len() == 12));

        let summary = h.summaries.get(&key()).await.unwrap().unwrap();
        assert_eq!(summary.cutpoint_sequence, 15);
        assert!(!h.orchestrator.compactor.concurrency_guard().is_held(&key()));
    }

    #[tokio::test]
    async fn test_validation_happens_before_io() {
        let h = harness(MockLlmClient::new().with_response("unused"), MockLlmClient::new());

        for (req, field) in [
            (ChatRequest::new("   ", PAGE, USER), "prompt"),
            (ChatRequest::new("hi", "", USER), "conversationKey"),
            (ChatRequest::new("hi", PAGE, " \t"), "userId"),
        ] {
            let err = h.orchestrator.reply(&req).await.unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Validation);
            assert!(err.to_string().contains(field), "{err}");
        }

        assert_eq!(h.generator.call_count(), 0);
        assert!(h.history.list(&key(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_read_failure_degrades_to_empty() {
        let history = Arc::new(FailingHistoryStore::new().fail_reads());
        seed(history.as_ref(), &key(), 4).await;
        let generator = Arc::new(MockLlmClient::new().with_response("Still here!"));
        let orchestrator = ReplyOrchestrator::builder(ContextConfig::default())
            .history(history.clone())
            .summaries(Arc::new(InMemorySummaryStore::new()))
            .profiles(Arc::new(InMemoryProfileStore::new()))
            .generator(generator.clone())
            .build()
            .unwrap();

        let reply = orchestrator.reply(&request("hi")).await.unwrap();
        assert_eq!(reply, "Still here!");
        assert_eq!(generator.last_messages().unwrap().len(), 2);
        assert_eq!(history.snapshot(&key()).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_user_append_failure_is_an_error() {
        let history = Arc::new(FailingHistoryStore::new().fail_user_appends());
        let generator = Arc::new(MockLlmClient::new().with_response("unused"));
        let orchestrator = ReplyOrchestrator::builder(ContextConfig::default())
            .history(history.clone())
            .summaries(Arc::new(InMemorySummaryStore::new()))
            .profiles(Arc::new(InMemoryProfileStore::new()))
            .generator(generator.clone())
            .build()
            .unwrap();

        let err = orchestrator.reply(&request("hi")).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Upstream);
        assert_eq!(generator.call_count(), 0);

        let response = orchestrator.handle(&request("hi")).await;
        assert!(matches!(
            response,
            ChatResponse::Error { category: ErrorCategory::Upstream, .. }
        ));
    }

    #[tokio::test]
    async fn test_assistant_append_failure_still_replies() {
        let history = Arc::new(FailingHistoryStore::new().fail_assistant_appends());
        let orchestrator = ReplyOrchestrator::builder(ContextConfig::default())
            .history(history.clone())
            .summaries(Arc::new(InMemorySummaryStore::new()))
            .profiles(Arc::new(InMemoryProfileStore::new()))
            .generator(Arc::new(MockLlmClient::new().with_response("Woof!")))
            .build()
            .unwrap();

        assert_eq!(orchestrator.reply(&request("hi")).await.unwrap(), "Woof!");
        let turns = history.snapshot(&key()).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_profile_and_location_layers() {
        let profiles = InMemoryProfileStore::new().with_profile(
            USER,
            ProfileContext::new("Alice").fact("favorite color is teal"),
        );
        let generator = Arc::new(MockLlmClient::new().with_response("Let's explore!"));
        let orchestrator = ReplyOrchestrator::builder(ContextConfig::default())
            .history(Arc::new(InMemoryHistoryStore::new()))
            .summaries(Arc::new(InMemorySummaryStore::new()))
            .profiles(Arc::new(profiles))
            .generator(generator.clone())
            .persona(Persona::new("Pip", "dragon"))
            .build()
            .unwrap();

        orchestrator
            .reply(&ChatRequest::new("where are we?", "/maps/desert", USER))
            .await
            .unwrap();

        let messages = generator.last_messages().unwrap();
        assert_eq!(messages.len(), 4);
        assert!(messages[0].text().contains("Your name is Pip"));
        assert!(messages[1].text().contains("The Sand Snake Expanse"));
        assert!(messages[2].text().contains("Alice"));
        assert!(messages[2].text().contains("teal"));
        assert_eq!(messages[3].text(), "where are we?");
    }

    #[tokio::test]
    async fn test_profile_failure_omits_layer() {
        let generator = Arc::new(MockLlmClient::new().with_response("ok"));
        let orchestrator = ReplyOrchestrator::builder(ContextConfig::default())
            .history(Arc::new(InMemoryHistoryStore::new()))
            .summaries(Arc::new(InMemorySummaryStore::new()))
            .profiles(Arc::new(FailingProfileStore))
            .generator(generator.clone())
            .build()
            .unwrap();

        assert_eq!(orchestrator.reply(&request("hi")).await.unwrap(), "ok");
        assert_eq!(generator.last_messages().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let h = harness(MockLlmClient::new().with_responses(["a", "b"]), MockLlmClient::new());
        h.orchestrator.reply(&request("on the pets page")).await.unwrap();
        h.orchestrator
            .reply(&ChatRequest::new("on the map", "/maps/city", USER))
            .await
            .unwrap();

        // 第二个会话看不到第一个会话的轮次
        let messages = h.generator.last_messages().unwrap();
        assert!(messages.iter().all(|m| m.text() != "on the pets page"));
        assert_eq!(h.history.list(&key(), None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_handle_as_rejects_other_users() {
        let h = harness(MockLlmClient::new().with_response("hi!"), MockLlmClient::new());

        let response = h.orchestrator.handle_as("", &request("hi")).await;
        assert!(matches!(response, ChatResponse::Error { category: ErrorCategory::Auth, .. }));

        let response = h.orchestrator.handle_as("mallory", &request("hi")).await;
        assert!(matches!(response, ChatResponse::Error { category: ErrorCategory::Auth, .. }));
        assert!(h.history.list(&key(), None).await.unwrap().is_empty());

        let response = h.orchestrator.handle_as(USER, &request("hi")).await;
        assert_eq!(response, ChatResponse::Reply { reply: "hi!".to_string() });
    }

    #[tokio::test]
    async fn test_reset_clears_history_and_summary() {
        let h = harness(
            MockLlmClient::new().with_responses(["one", "two"]),
            MockLlmClient::new().with_response("folded"),
        );
        seed(h.history.as_ref(), &key(), 25).await;
        h.orchestrator.reply(&request("hi")).await.unwrap();
        assert!(h.orchestrator.current_summary(USER, PAGE).await.unwrap().is_some());

        h.orchestrator.reset(USER, PAGE).await.unwrap();
        assert!(h.orchestrator.current_summary(USER, PAGE).await.unwrap().is_none());
        assert!(h.history.list(&key(), None).await.unwrap().is_empty());

        // 重置后序号重新从 1 开始
        h.orchestrator.reply(&request("again")).await.unwrap();
        let turns = h.history.list(&key(), None).await.unwrap();
        assert_eq!(turns[0].sequence, 1);
    }

    #[tokio::test]
    async fn test_reset_during_compaction_leaves_no_old_summary() {
        let h = harness(
            MockLlmClient::new().with_responses(["before reset", "after reset"]),
            MockLlmClient::new()
                .with_response("OLD CONVERSATION SUMMARY")
                .with_latency(Duration::from_millis(100)),
        );
        seed(h.history.as_ref(), &key(), 25).await;

        let req = request("still there?");
        let (reply, reset) = tokio::join!(h.orchestrator.reply(&req), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            h.orchestrator.reset(USER, PAGE).await
        });
        reply.unwrap();
        reset.unwrap();

        // reset 等到压缩结束才执行，旧摘要随后被删除
        assert_eq!(h.summarizer.call_count(), 1);
        assert!(h.orchestrator.current_summary(USER, PAGE).await.unwrap().is_none());

        h.orchestrator.reply(&request("fresh start")).await.unwrap();
        let messages = h.generator.last_messages().unwrap();
        assert!(messages.iter().all(|m| !m.text().contains("OLD CONVERSATION")));
        assert!(messages.iter().all(|m| !m.text().starts_with("turn ")));
        assert_eq!(messages.last().unwrap().text(), "fresh start");
        assert!(!h.orchestrator.compactor.concurrency_guard().is_held(&key()));
    }

    #[tokio::test]
    async fn test_summary_read_failure_degrades_to_window_only() {
        let history = Arc::new(InMemoryHistoryStore::new());
        seed(history.as_ref(), &key(), 25).await;
        let generator = Arc::new(MockLlmClient::new().with_response("Still me!"));
        let summarizer = Arc::new(MockLlmClient::new().with_response("unused"));
        let orchestrator = ReplyOrchestrator::builder(ContextConfig::default())
            .history(history.clone())
            .summaries(Arc::new(FailingSummaryStore::new().fail_reads()))
            .profiles(Arc::new(InMemoryProfileStore::new()))
            .generator(generator.clone())
            .summarizer(summarizer.clone())
            .build()
            .unwrap();

        assert_eq!(orchestrator.reply(&request("hello?")).await.unwrap(), "Still me!");

        let messages = generator.last_messages().unwrap();
        // persona + 最近 10 条 + 新消息，没有摘要层
        assert_eq!(messages.len(), 12);
        assert!(messages.iter().all(|m| !m.text().starts_with("Summary of")));
        assert_eq!(messages[1].text(), "turn 16");
        assert_eq!(messages[10].text(), "turn 25");
        assert_eq!(summarizer.call_count(), 0);
        assert_eq!(history.list(&key(), None).await.unwrap().len(), 27);
    }

    #[tokio::test]
    async fn test_cutpoint_never_reaches_the_window() {
        let responses: Vec<String> = (0..30).map(|i| format!("reply {i}")).collect();
        let summaries: Vec<String> = (0..30).map(|i| format!("summary {i}")).collect();
        let h = harness(
            MockLlmClient::new().with_responses(responses),
            MockLlmClient::new().with_responses(summaries),
        );

        for i in 0..30 {
            h.orchestrator.reply(&request(&format!("message {i}"))).await.unwrap();
            let turns = h.history.list(&key(), None).await.unwrap();
            if let Some(summary) = h.summaries.get(&key()).await.unwrap() {
                let last = turns.last().unwrap().sequence;
                assert!(summary.cutpoint_sequence + 10 <= last);
            }
        }
        assert!(h.summarizer.call_count() > 0);
    }

    #[test]
    fn test_build_requires_dependencies() {
        let err = ReplyOrchestrator::builder(ContextConfig::default())
            .history(Arc::new(InMemoryHistoryStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("summaries"));

        let err = ReplyOrchestrator::builder(ContextConfig::default().window(0))
            .history(Arc::new(InMemoryHistoryStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, CompanionError::Config(_)));
    }
}
