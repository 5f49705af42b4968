//! 可注入故障的存储替身，用于测试降级路径。
//!
//! 每个替身内部包一层进程内存实现，未开启的故障开关下行为与之完全一致。

use crate::error::{Result, StoreError};
use crate::memory::{
    ConversationKey, HistoryStore, InMemoryHistoryStore, InMemorySummaryStore, ProfileContext,
    ProfileStore, Role, Summary, SummaryStore, Turn,
};
use async_trait::async_trait;

fn unavailable(what: &str) -> crate::error::CompanionError {
    StoreError::Unavailable(format!("injected {what} failure")).into()
}

// ── FailingHistoryStore ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct FailingHistoryStore {
    inner: InMemoryHistoryStore,
    fail_reads: bool,
    fail_user_appends: bool,
    fail_assistant_appends: bool,
}

impl FailingHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `list` 总是失败
    pub fn fail_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// 用户轮次追加总是失败
    pub fn fail_user_appends(mut self) -> Self {
        self.fail_user_appends = true;
        self
    }

    /// 助手轮次追加总是失败
    pub fn fail_assistant_appends(mut self) -> Self {
        self.fail_assistant_appends = true;
        self
    }

    /// 绕过故障开关读取底层存储
    pub async fn snapshot(&self, key: &ConversationKey) -> Result<Vec<Turn>> {
        self.inner.list(key, None).await
    }
}

#[async_trait]
impl HistoryStore for FailingHistoryStore {
    async fn append(&self, key: &ConversationKey, role: Role, text: &str) -> Result<Turn> {
        match role {
            Role::User if self.fail_user_appends => Err(unavailable("history append")),
            Role::Assistant if self.fail_assistant_appends => Err(unavailable("history append")),
            _ => self.inner.append(key, role, text).await,
        }
    }

    async fn list(&self, key: &ConversationKey, since_sequence: Option<u64>) -> Result<Vec<Turn>> {
        if self.fail_reads {
            return Err(unavailable("history read"));
        }
        self.inner.list(key, since_sequence).await
    }

    async fn clear(&self, key: &ConversationKey) -> Result<()> {
        self.inner.clear(key).await
    }
}

// ── FailingSummaryStore ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct FailingSummaryStore {
    inner: InMemorySummaryStore,
    fail_reads: bool,
    fail_writes: bool,
}

impl FailingSummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }
}

#[async_trait]
impl SummaryStore for FailingSummaryStore {
    async fn get(&self, key: &ConversationKey) -> Result<Option<Summary>> {
        if self.fail_reads {
            return Err(unavailable("summary read"));
        }
        self.inner.get(key).await
    }

    async fn upsert_if_newer(
        &self,
        key: &ConversationKey,
        text: &str,
        cutpoint_sequence: u64,
    ) -> Result<bool> {
        if self.fail_writes {
            return Err(unavailable("summary write"));
        }
        self.inner.upsert_if_newer(key, text, cutpoint_sequence).await
    }

    async fn delete(&self, key: &ConversationKey) -> Result<bool> {
        self.inner.delete(key).await
    }
}

// ── FailingProfileStore ───────────────────────────────────────────────────────

/// 所有读取都失败的资料存储
#[derive(Default)]
pub struct FailingProfileStore;

#[async_trait]
impl ProfileStore for FailingProfileStore {
    async fn get(&self, _user_id: &str) -> Result<Option<ProfileContext>> {
        Err(unavailable("profile read"))
    }
}
