//! 用户资料（只读）
//!
//! 资料的增删改由外部系统负责，这里只负责读取并渲染成一段可注入上下文的文字。

use crate::error::{Result, StoreError};
use crate::memory::expand_tilde;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// 可选的个性化上下文
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileContext {
    pub display_name: Option<String>,
    #[serde(default)]
    pub preference_facts: Vec<String>,
}

impl ProfileContext {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            preference_facts: Vec::new(),
        }
    }

    pub fn fact(mut self, fact: impl Into<String>) -> Self {
        self.preference_facts.push(fact.into());
        self
    }

    /// 渲染为上下文文字；姓名和偏好都为空时返回 `None`
    pub fn render(&self) -> Option<String> {
        let name = self
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let facts: Vec<&str> = self
            .preference_facts
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect();

        let mut parts = Vec::new();
        if let Some(name) = name {
            parts.push(format!("Your owner's name is {}.", name));
        }
        if !facts.is_empty() {
            parts.push(format!("Things you know about them: {}.", facts.join("; ")));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<ProfileContext>>;
}

// ── InMemoryProfileStore ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: HashMap<String, ProfileContext>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, user_id: impl Into<String>, profile: ProfileContext) -> Self {
        self.profiles.insert(user_id.into(), profile);
        self
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<ProfileContext>> {
        Ok(self.profiles.get(user_id).cloned())
    }
}

// ── FileProfileStore ──────────────────────────────────────────────────────────

/// 资料文件中的一行记录
#[derive(Debug, Clone, Default, Deserialize)]
struct ProfileRecord {
    #[serde(default, alias = "display_name")]
    full_name: Option<String>,
    #[serde(default)]
    favorite_color: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    facts: Vec<String>,
}

impl From<ProfileRecord> for ProfileContext {
    fn from(record: ProfileRecord) -> Self {
        let mut preference_facts = Vec::new();
        if let Some(color) = record.favorite_color.filter(|c| !c.trim().is_empty()) {
            preference_facts.push(format!("favorite color is {}", color.trim()));
        }
        if let Some(bio) = record.bio.filter(|b| !b.trim().is_empty()) {
            preference_facts.push(bio.trim().to_string());
        }
        preference_facts.extend(record.facts);
        Self {
            display_name: record.full_name,
            preference_facts,
        }
    }
}

/// 启动时从 JSON 文件一次性加载的资料存储
///
/// 文件格式（文件不存在时视为空）：
/// ```json
/// {
///   "alice": { "full_name": "Alice", "favorite_color": "teal", "bio": "Loves hiking" }
/// }
/// ```
pub struct FileProfileStore {
    profiles: HashMap<String, ProfileContext>,
}

impl FileProfileStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand_tilde(path.as_ref());
        let profiles = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::Io(format!("read profile file: {e}")))?;
            match serde_json::from_str::<HashMap<String, ProfileRecord>>(&raw) {
                Ok(records) => records
                    .into_iter()
                    .map(|(user, record)| (user, ProfileContext::from(record)))
                    .collect(),
                Err(e) => {
                    warn!("Profile file unreadable, no profiles loaded: {e}");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };
        info!(path = %path.display(), profiles = profiles.len(), "🗂️ FileProfileStore 初始化");
        Ok(Self { profiles })
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<ProfileContext>> {
        Ok(self.profiles.get(user_id).cloned())
    }
}
