use crate::compression::guard::ConcurrencyGuard;
use crate::compression::prompt::{DefaultSummaryPrompt, SummaryPromptBuilder};
use crate::config::ContextConfig;
use crate::error::{CompanionError, Result};
use crate::llm::LlmClient;
use crate::llm::types::Message;
use crate::memory::{ConversationKey, Summary, SummaryStore, Turn, now_secs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 一次摘要解析的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// 历史未超过阈值，无需摘要
    BelowThreshold,
    /// 已有摘要覆盖到了窗口之前
    Covered,
    /// 本次完成了一次压缩并写入
    Compacted,
    /// 同一会话的另一次压缩正在进行，沿用已有摘要
    Busy,
    /// 压缩失败，沿用已有摘要，留待后续请求重试
    Deferred,
    /// 读取历史之后会话被重置，快照已失效，不写入也不沿用摘要
    Stale,
}

/// [`SummarizationCompactor::resolve`] 的返回值
#[derive(Debug, Clone)]
pub struct ResolvedSummary {
    pub summary: Option<Summary>,
    pub outcome: CompactionOutcome,
}

/// 根据历史长度和已有切点决定是否需要压缩
///
/// 返回 `Ok(cutpoint)` 表示需要把切点推进到该序号，`Err` 给出无需压缩的原因。
fn eligible_cutpoint(
    history: &[Turn],
    existing_cutpoint: Option<u64>,
    threshold: usize,
    window: usize,
) -> std::result::Result<u64, CompactionOutcome> {
    let total = history.len();
    // 窗口之前最后一条轮次的序号；历史不足一个窗口时为 0
    let target = total
        .checked_sub(window + 1)
        .map(|idx| history[idx].sequence)
        .unwrap_or(0);

    if let Some(cut) = existing_cutpoint
        && cut >= target
    {
        return Err(CompactionOutcome::Covered);
    }
    if total <= threshold {
        return Err(CompactionOutcome::BelowThreshold);
    }
    if target <= existing_cutpoint.unwrap_or(0) {
        return Err(CompactionOutcome::Covered);
    }
    Ok(target)
}

/// 摘要压缩器：历史超过 `summary_threshold` 后，把窗口之前的轮次折叠进摘要。
///
/// 压缩是机会性的：拿不到会话租约、生成失败、超时或写入失败都只会记录日志，
/// 并返回先前存储的摘要，绝不会让当前回复失败。
///
/// ```text
/// [1 ........ cutpoint] [cutpoint+1 .. total-window] [最近 window 条]
///   已在旧摘要中          本次折叠                      始终原样保留
/// ```
pub struct SummarizationCompactor {
    summaries: Arc<dyn SummaryStore>,
    llm: Arc<dyn LlmClient>,
    prompt_builder: Box<dyn SummaryPromptBuilder>,
    guard: ConcurrencyGuard,
    summary_threshold: usize,
    window: usize,
    max_sentences: usize,
    timeout: Duration,
}

impl SummarizationCompactor {
    pub fn new(
        summaries: Arc<dyn SummaryStore>,
        llm: Arc<dyn LlmClient>,
        config: &ContextConfig,
    ) -> Self {
        Self {
            summaries,
            llm,
            prompt_builder: Box::new(DefaultSummaryPrompt),
            guard: ConcurrencyGuard::new(),
            summary_threshold: config.summary_threshold,
            window: config.window,
            max_sentences: config.summary_max_sentences,
            timeout: config.summary_timeout(),
        }
    }

    /// 替换摘要提示词策略
    pub fn prompt(mut self, builder: impl SummaryPromptBuilder + 'static) -> Self {
        self.prompt_builder = Box::new(builder);
        self
    }

    /// 与其他压缩器共享同一个会话互斥
    pub fn guard(mut self, guard: ConcurrencyGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn concurrency_guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// 会话当前的重置纪元，读取历史之前取一次，再交给 [`resolve_at`](Self::resolve_at)
    pub fn epoch(&self, key: &ConversationKey) -> u64 {
        self.guard.epoch(key)
    }

    /// 以当前纪元解析摘要，适用于刚刚读取的历史
    pub async fn resolve(&self, key: &ConversationKey, history: &[Turn]) -> ResolvedSummary {
        self.resolve_at(key, history, self.epoch(key)).await
    }

    /// 解析当前请求应使用的摘要，必要时触发一次压缩。
    ///
    /// `history` 为该会话按序号升序的完整历史，`epoch` 为读取它之前的重置纪元。
    /// 拿到租约时若纪元已变化，说明期间会话被重置，不会写入任何摘要。
    pub async fn resolve_at(
        &self,
        key: &ConversationKey,
        history: &[Turn],
        epoch: u64,
    ) -> ResolvedSummary {
        let existing = match self.summaries.get(key).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(conversation = %key, phase = "summary", error = %e, "摘要读取失败，按无摘要处理");
                None
            }
        };

        let cutpoint = match eligible_cutpoint(
            history,
            existing.as_ref().map(|s| s.cutpoint_sequence),
            self.summary_threshold,
            self.window,
        ) {
            Ok(cutpoint) => cutpoint,
            Err(outcome) => {
                debug!(conversation = %key, turns = history.len(), ?outcome, "无需压缩");
                return ResolvedSummary {
                    summary: existing,
                    outcome,
                };
            }
        };

        let Some(_lease) = self.guard.try_acquire(key) else {
            debug!(conversation = %key, "⏳ 另一压缩正在进行，沿用已有摘要");
            return ResolvedSummary {
                summary: existing,
                outcome: CompactionOutcome::Busy,
            };
        };

        if self.guard.epoch(key) != epoch {
            debug!(conversation = %key, "会话已重置，放弃基于旧历史的压缩");
            return ResolvedSummary {
                summary: None,
                outcome: CompactionOutcome::Stale,
            };
        }

        match self.compact(key, history, existing.clone(), cutpoint).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(
                    conversation = %key,
                    phase = "compaction",
                    cutpoint,
                    error = %e,
                    "压缩失败，沿用已有摘要"
                );
                ResolvedSummary {
                    summary: existing,
                    outcome: CompactionOutcome::Deferred,
                }
            }
        }
    }

    /// 持有租约时执行压缩；租约由调用方持有，任何返回路径都会释放
    async fn compact(
        &self,
        key: &ConversationKey,
        history: &[Turn],
        existing: Option<Summary>,
        cutpoint: u64,
    ) -> Result<ResolvedSummary> {
        // 拿到租约前可能刚有另一持有者写完，重新读一次
        let current = self.summaries.get(key).await?.or(existing);
        let previous_cut = current.as_ref().map(|s| s.cutpoint_sequence).unwrap_or(0);
        if previous_cut >= cutpoint {
            return Ok(ResolvedSummary {
                summary: current,
                outcome: CompactionOutcome::Covered,
            });
        }

        let surplus: Vec<Turn> = history
            .iter()
            .filter(|t| t.sequence > previous_cut && t.sequence <= cutpoint)
            .cloned()
            .collect();
        info!(
            conversation = %key,
            from = previous_cut + 1,
            to = cutpoint,
            turns = surplus.len(),
            "🗜️ 开始压缩对话历史"
        );

        let prompt = self.prompt_builder.build(
            current.as_ref().map(|s| s.text.as_str()),
            &surplus,
            self.max_sentences,
        );
        let text = match tokio::time::timeout(
            self.timeout,
            self.llm.complete(vec![Message::user(prompt)]),
        )
        .await
        {
            Ok(result) => result.map_err(|e| {
                CompanionError::Summarization(format!("summarizer call failed: {e}"))
            })?,
            Err(_) => {
                return Err(CompanionError::Summarization(format!(
                    "summarizer timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
        };
        let text = text.trim();
        if text.is_empty() {
            return Err(CompanionError::Summarization(
                "summarizer returned empty text".to_string(),
            ));
        }

        if !self.summaries.upsert_if_newer(key, text, cutpoint).await? {
            // 并发写入者已写入相同或更新的切点
            let stored = self.summaries.get(key).await?;
            debug!(conversation = %key, cutpoint, "摘要已被更新的切点覆盖");
            return Ok(ResolvedSummary {
                summary: stored.or(current),
                outcome: CompactionOutcome::Covered,
            });
        }

        info!(conversation = %key, cutpoint, "✅ 摘要已更新");
        Ok(ResolvedSummary {
            summary: Some(Summary {
                key: key.clone(),
                text: text.to_string(),
                cutpoint_sequence: cutpoint,
                updated_at: now_secs(),
            }),
            outcome: CompactionOutcome::Compacted,
        })
    }
}
