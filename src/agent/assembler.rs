use crate::llm::types::Message;
use crate::memory::Turn;

/// 一次生成调用的全部上下文层，缺省的可选层以 `None` 表示。
///
/// [`assemble`](ContextLayers::assemble) 按固定顺序输出：
///
/// ```text
/// persona → location → profile → summary → window（旧 → 新）→ 新用户消息
/// ```
///
/// 纯函数：不读存储、不访问网络、不依赖时钟或随机数，相同输入总是得到相同输出。
#[derive(Debug, Clone, Copy)]
pub struct ContextLayers<'a> {
    pub persona: &'a str,
    pub location: Option<&'a str>,
    pub profile: Option<&'a str>,
    pub summary: Option<&'a str>,
    pub window: &'a [Turn],
    pub new_turn: &'a str,
}

impl<'a> ContextLayers<'a> {
    pub fn new(persona: &'a str, new_turn: &'a str) -> Self {
        Self {
            persona,
            location: None,
            profile: None,
            summary: None,
            window: &[],
            new_turn,
        }
    }

    pub fn location(mut self, location: Option<&'a str>) -> Self {
        self.location = location;
        self
    }

    pub fn profile(mut self, profile: Option<&'a str>) -> Self {
        self.profile = profile;
        self
    }

    pub fn summary(mut self, summary: Option<&'a str>) -> Self {
        self.summary = summary;
        self
    }

    pub fn window(mut self, window: &'a [Turn]) -> Self {
        self.window = window;
        self
    }

    pub fn assemble(&self) -> Vec<Message> {
        let optional = [
            self.location.map(str::to_string),
            self.profile.map(str::to_string),
            self.summary
                .filter(|s| !s.trim().is_empty())
                .map(|s| format!("Summary of your earlier conversation: {}", s.trim())),
        ];

        let mut messages = Vec::with_capacity(2 + optional.len() + self.window.len());
        messages.push(Message::system(self.persona.to_string()));
        messages.extend(
            optional
                .into_iter()
                .flatten()
                .filter(|text| !text.trim().is_empty())
                .map(Message::system),
        );
        messages.extend(self.window.iter().map(Turn::to_message));
        messages.push(Message::user(self.new_turn.to_string()));
        messages
    }
}
