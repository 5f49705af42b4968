//! 会话摘要存储
//!
//! 每个 [`ConversationKey`] 至多一条摘要。写入只能让 `cutpoint_sequence` 前进：
//! 当已存储的切点大于等于新切点时，[`SummaryStore::upsert_if_newer`] 拒绝写入并返回 `false`。

use crate::error::{Result, StoreError};
use crate::memory::{ConversationKey, ensure_parent, expand_tilde, now_secs};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 压缩后的会话记忆
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub key: ConversationKey,
    pub text: String,
    /// 最后一条被折叠进摘要的轮次序号
    pub cutpoint_sequence: u64,
    /// 最后更新时间（Unix 秒）
    pub updated_at: u64,
}

#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn get(&self, key: &ConversationKey) -> Result<Option<Summary>>;

    /// 仅当新切点严格大于已存储切点时写入
    async fn upsert_if_newer(
        &self,
        key: &ConversationKey,
        text: &str,
        cutpoint_sequence: u64,
    ) -> Result<bool>;

    /// 删除摘要（会话重置），返回是否存在
    async fn delete(&self, key: &ConversationKey) -> Result<bool>;
}

type Summaries = HashMap<ConversationKey, Summary>;

fn upsert_into(
    data: &mut Summaries,
    key: &ConversationKey,
    text: &str,
    cutpoint_sequence: u64,
) -> Option<Option<Summary>> {
    if let Some(existing) = data.get(key)
        && existing.cutpoint_sequence >= cutpoint_sequence
    {
        debug!(
            conversation = %key,
            stored = existing.cutpoint_sequence,
            offered = cutpoint_sequence,
            "Summary write rejected, stored cutpoint is not older"
        );
        return None;
    }
    let previous = data.insert(
        key.clone(),
        Summary {
            key: key.clone(),
            text: text.to_string(),
            cutpoint_sequence,
            updated_at: now_secs(),
        },
    );
    Some(previous)
}

// ── InMemorySummaryStore ──────────────────────────────────────────────────────

pub struct InMemorySummaryStore {
    data: RwLock<Summaries>,
}

impl Default for InMemorySummaryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn get(&self, key: &ConversationKey) -> Result<Option<Summary>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn upsert_if_newer(
        &self,
        key: &ConversationKey,
        text: &str,
        cutpoint_sequence: u64,
    ) -> Result<bool> {
        let mut data = self.data.write().await;
        Ok(upsert_into(&mut data, key, text, cutpoint_sequence).is_some())
    }

    async fn delete(&self, key: &ConversationKey) -> Result<bool> {
        Ok(self.data.write().await.remove(key).is_some())
    }
}

// ── FileSummaryStore ──────────────────────────────────────────────────────────

/// 基于 JSON 文件的摘要存储，格式为 [`Summary`] 数组
pub struct FileSummaryStore {
    path: PathBuf,
    data: RwLock<Summaries>,
}

impl FileSummaryStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand_tilde(path.as_ref());
        ensure_parent(&path)?;
        let data: Summaries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::Io(format!("read summary file: {e}")))?;
            serde_json::from_str::<Vec<Summary>>(&raw)
                .map_err(|e| {
                    warn!(path = %path.display(), error = %e, "摘要文件无法解析");
                    StoreError::Serialization(format!(
                        "summary file {} is unreadable: {e}",
                        path.display()
                    ))
                })?
                .into_iter()
                .map(|s| (s.key.clone(), s))
                .collect()
        } else {
            HashMap::new()
        };
        info!(path = %path.display(), summaries = data.len(), "🗂️ FileSummaryStore 初始化");
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    async fn flush(&self, data: &Summaries) -> Result<()> {
        let mut list: Vec<&Summary> = data.values().collect();
        list.sort_by(|a, b| a.key.cmp(&b.key));
        let json = serde_json::to_string_pretty(&list)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| StoreError::Io(format!("write summary file: {e}")))?;
        debug!(path = %self.path.display(), "💾 Summary 已持久化");
        Ok(())
    }
}

#[async_trait]
impl SummaryStore for FileSummaryStore {
    async fn get(&self, key: &ConversationKey) -> Result<Option<Summary>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn upsert_if_newer(
        &self,
        key: &ConversationKey,
        text: &str,
        cutpoint_sequence: u64,
    ) -> Result<bool> {
        let mut data = self.data.write().await;
        let Some(previous) = upsert_into(&mut data, key, text, cutpoint_sequence) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(&data).await {
            match previous {
                Some(old) => data.insert(key.clone(), old),
                None => data.remove(key),
            };
            return Err(e);
        }
        Ok(true)
    }

    async fn delete(&self, key: &ConversationKey) -> Result<bool> {
        let mut data = self.data.write().await;
        let found = data.remove(key).is_some();
        if found {
            self.flush(&data).await?;
        }
        Ok(found)
    }
}
