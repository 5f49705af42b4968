//! 对话记忆
//!
//! 三个存储各司其职：
//!
//! | 存储 | 内容 | 作用域 |
//! |------|------|--------|
//! | [`HistoryStore`] | 只追加的对话轮次日志 | 每个 [`ConversationKey`] |
//! | [`SummaryStore`] | 当前唯一的压缩摘要 | 每个 [`ConversationKey`] |
//! | [`ProfileStore`] | 只读的用户资料 | 每个用户 |
//!
//! 每种存储都有进程内存实现（测试用）和 JSON 文件实现（本地单机用）。
//!
//! ```rust,no_run
//! use pet_companion::memory::{ConversationKey, FileHistoryStore, HistoryStore, Role};
//!
//! # async fn example() -> pet_companion::error::Result<()> {
//! let history = FileHistoryStore::new("~/.pet-companion/history.json")?;
//! let key = ConversationKey::new("alice", "/maps/city");
//! let turn = history.append(&key, Role::User, "hi").await?;
//! assert_eq!(turn.sequence, 1);
//! # Ok(())
//! # }
//! ```

pub mod history;
pub mod profile;
pub mod summary;

pub use history::{FileHistoryStore, HistoryStore, InMemoryHistoryStore};
pub use profile::{FileProfileStore, InMemoryProfileStore, ProfileContext, ProfileStore};
pub use summary::{FileSummaryStore, InMemorySummaryStore, Summary, SummaryStore};

use crate::llm::types::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// 会话标识 `(user_id, conversation_id)`
///
/// `conversation_id` 对本模块是不透明字符串，当前取页面路径（如 `/maps/city`）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub user_id: String,
    pub conversation_id: String,
}

impl ConversationKey {
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_id, self.conversation_id)
    }
}

/// 轮次角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// 单条对话轮次，追加后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    /// 每个会话内从 1 开始严格递增且无间隙，是唯一权威的顺序
    pub sequence: u64,
    /// 写入时间（Unix 秒），可能重复
    pub created_at: u64,
}

impl Turn {
    pub fn to_message(&self) -> Message {
        match self.role {
            Role::User => Message::user(self.text.clone()),
            Role::Assistant => Message::assistant(self.text.clone()),
        }
    }
}

// ── 存储实现共用的工具函数 ────────────────────────────────────────────────────

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub(crate) fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.starts_with("~/")
        && let Some(home) = std::env::var("HOME")
            .ok()
            .or_else(|| std::env::var("USERPROFILE").ok())
    {
        return PathBuf::from(home).join(&s[2..]);
    }
    path.to_path_buf()
}

pub(crate) fn ensure_parent(path: &Path) -> crate::error::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            crate::error::StoreError::Io(format!("create dir {}: {e}", parent.display()))
        })?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join("pet-companion-tests")
        .join(format!("{}-{}.json", name, uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_to_message() {
        let turn = Turn {
            role: Role::Assistant,
            text: "Purr".to_string(),
            sequence: 2,
            created_at: 0,
        };
        let msg = turn.to_message();
        assert_eq!(msg.role, "assistant");
        assert_eq!(msg.text(), "Purr");
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        let role: Role = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, Role::Assistant);
    }

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        let p = Path::new("/tmp/history.json");
        assert_eq!(expand_tilde(p), PathBuf::from("/tmp/history.json"));
    }
}
