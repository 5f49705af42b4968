//! 对话历史存储
//!
//! 每个 [`ConversationKey`] 对应一段只追加的轮次日志。序号在写锁内分配，
//! 并发写入者之间也保持严格递增、无间隙，不依赖墙钟时间。

use crate::error::{Result, StoreError};
use crate::memory::{ConversationKey, Role, Turn, ensure_parent, expand_tilde, now_secs};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 对话历史的统一存储接口
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// 追加一条轮次，返回带有新序号的记录
    async fn append(&self, key: &ConversationKey, role: Role, text: &str) -> Result<Turn>;

    /// 按序号升序列出轮次；`since_sequence` 为 `Some(n)` 时只返回序号大于 n 的部分
    async fn list(&self, key: &ConversationKey, since_sequence: Option<u64>) -> Result<Vec<Turn>>;

    /// 清空整个会话（外部的重置操作）
    async fn clear(&self, key: &ConversationKey) -> Result<()>;
}

type Logs = HashMap<ConversationKey, Vec<Turn>>;

fn append_to(logs: &mut Logs, key: &ConversationKey, role: Role, text: &str) -> Turn {
    let turns = logs.entry(key.clone()).or_default();
    let turn = Turn {
        role,
        text: text.to_string(),
        sequence: turns.last().map(|t| t.sequence + 1).unwrap_or(1),
        created_at: now_secs(),
    };
    turns.push(turn.clone());
    turn
}

fn list_from(logs: &Logs, key: &ConversationKey, since_sequence: Option<u64>) -> Vec<Turn> {
    let since = since_sequence.unwrap_or(0);
    logs.get(key)
        .map(|turns| {
            turns
                .iter()
                .filter(|t| t.sequence > since)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

// ── InMemoryHistoryStore ──────────────────────────────────────────────────────

/// 进程内存历史，重启后清空，适合测试
pub struct InMemoryHistoryStore {
    data: RwLock<Logs>,
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, key: &ConversationKey, role: Role, text: &str) -> Result<Turn> {
        let mut data = self.data.write().await;
        Ok(append_to(&mut data, key, role, text))
    }

    async fn list(&self, key: &ConversationKey, since_sequence: Option<u64>) -> Result<Vec<Turn>> {
        Ok(list_from(&*self.data.read().await, key, since_sequence))
    }

    async fn clear(&self, key: &ConversationKey) -> Result<()> {
        self.data.write().await.remove(key);
        Ok(())
    }
}

// ── FileHistoryStore ──────────────────────────────────────────────────────────

/// 文件中的单个会话记录
#[derive(Serialize, Deserialize)]
struct ConversationLog {
    key: ConversationKey,
    turns: Vec<Turn>,
}

/// 基于 JSON 文件的历史存储
///
/// 写时立即落盘，读时从内存缓存返回。落盘在写锁内完成，
/// 文件内容因此总与某个完整的内存状态一致。
///
/// 存储格式：
/// ```json
/// [
///   { "key": { "user_id": "alice", "conversation_id": "/maps/city" },
///     "turns": [ { "role": "user", "text": "hi", "sequence": 1, "created_at": 123 } ] }
/// ]
/// ```
pub struct FileHistoryStore {
    path: PathBuf,
    data: RwLock<Logs>,
}

impl FileHistoryStore {
    /// 打开或创建历史文件，自动建父目录
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand_tilde(path.as_ref());
        ensure_parent(&path)?;
        let data: Logs = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::Io(format!("read history file: {e}")))?;
            // 历史是唯一的记录来源：无法解析时拒绝打开，而不是在下次写入时覆盖它
            serde_json::from_str::<Vec<ConversationLog>>(&raw)
                .map_err(|e| {
                    warn!(path = %path.display(), error = %e, "历史文件无法解析");
                    StoreError::Serialization(format!(
                        "history file {} is unreadable: {e}",
                        path.display()
                    ))
                })?
                .into_iter()
                .map(|log| (log.key, log.turns))
                .collect()
        } else {
            HashMap::new()
        };
        let turn_count: usize = data.values().map(Vec::len).sum();
        info!(path = %path.display(), conversations = data.len(), turns = turn_count, "🗂️ FileHistoryStore 初始化");
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    async fn flush(&self, data: &Logs) -> Result<()> {
        let mut logs: Vec<ConversationLog> = data
            .iter()
            .map(|(key, turns)| ConversationLog {
                key: key.clone(),
                turns: turns.clone(),
            })
            .collect();
        logs.sort_by(|a, b| a.key.cmp(&b.key));
        let json = serde_json::to_string_pretty(&logs)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| StoreError::Io(format!("write history file: {e}")))?;
        debug!(path = %self.path.display(), "💾 History 已持久化");
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn append(&self, key: &ConversationKey, role: Role, text: &str) -> Result<Turn> {
        let mut data = self.data.write().await;
        let turn = append_to(&mut data, key, role, text);
        if let Err(e) = self.flush(&data).await {
            // 落盘失败时回滚，保证内存与文件一致
            if let Some(turns) = data.get_mut(key) {
                turns.pop();
            }
            return Err(e);
        }
        Ok(turn)
    }

    async fn list(&self, key: &ConversationKey, since_sequence: Option<u64>) -> Result<Vec<Turn>> {
        Ok(list_from(&*self.data.read().await, key, since_sequence))
    }

    async fn clear(&self, key: &ConversationKey) -> Result<()> {
        let mut data = self.data.write().await;
        if data.remove(key).is_some() {
            self.flush(&data).await?;
            info!(conversation = %key, "🗑️ 会话历史已清空");
        }
        Ok(())
    }
}
