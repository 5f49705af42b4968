//! 宠物人设与地图位置
//!
//! 人设文字作为上下文第一层；位置文字由会话 id（页面路径）推导，
//! 只有 `/maps/<id>` 形式的会话才会带上位置层。

use std::collections::BTreeMap;

const BASE_PERSONA: &str = "You are a friendly virtual pet. Respond cheerfully and stay on topic. \
Keep replies brief (1-2 sentences).";

const MAP_PREFIX: &str = "/maps/";

/// 用户的宠物
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Persona {
    name: Option<String>,
    kind: Option<String>,
}

impl Persona {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::default().name(name).kind(kind)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into().trim().to_string()).filter(|n| !n.is_empty());
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into().trim().to_lowercase()).filter(|k| !k.is_empty());
        self
    }

    /// 作为 system 层注入的人设文字
    pub fn text(&self) -> String {
        match (&self.name, &self.kind) {
            (Some(name), Some(kind)) => {
                format!("{BASE_PERSONA} Your name is {name} and you are a {kind}.")
            }
            (Some(name), None) => format!("{BASE_PERSONA} Your name is {name}."),
            (None, Some(kind)) => format!("{BASE_PERSONA} You are a {kind}."),
            (None, None) => BASE_PERSONA.to_string(),
        }
    }
}

/// 地图 id → 地图名称
#[derive(Debug, Clone)]
pub struct LocationCatalog {
    maps: BTreeMap<String, String>,
}

impl Default for LocationCatalog {
    fn default() -> Self {
        Self::empty()
            .with_map("city", "The Great City of Archadeus")
            .with_map("desert", "The Sand Snake Expanse")
            .with_map("coast", "The Eldritch Coast")
    }
}

impl LocationCatalog {
    pub fn empty() -> Self {
        Self {
            maps: BTreeMap::new(),
        }
    }

    pub fn with_map(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.maps.insert(id.into(), name.into());
        self
    }

    pub fn map_name(&self, id: &str) -> Option<&str> {
        self.maps.get(id).map(String::as_str)
    }

    pub fn maps(&self) -> impl Iterator<Item = (&str, &str)> {
        self.maps.iter().map(|(id, name)| (id.as_str(), name.as_str()))
    }

    /// 由会话 id 推导位置文字；非地图页面返回 `None`
    pub fn location_text(&self, conversation_id: &str) -> Option<String> {
        let map_id = conversation_id
            .strip_prefix(MAP_PREFIX)?
            .trim_end_matches('/');
        if map_id.is_empty() {
            return None;
        }
        let title = self.map_name(map_id).unwrap_or(map_id);
        Some(format!(
            "You and your owner are currently exploring {title}. Mention it when it fits."
        ))
    }
}
