use crate::memory::Turn;

/// 摘要提示词构建接口，支持自定义摘要策略
pub trait SummaryPromptBuilder: Send + Sync {
    /// `previous` 为已有摘要（若有），`turns` 为本次需要折叠的轮次
    fn build(&self, previous: Option<&str>, turns: &[Turn], max_sentences: usize) -> String;
}

/// 默认摘要提示词：把旧摘要和新增轮次一起压缩成几句话
pub struct DefaultSummaryPrompt;

impl SummaryPromptBuilder for DefaultSummaryPrompt {
    fn build(&self, previous: Option<&str>, turns: &[Turn], max_sentences: usize) -> String {
        let transcript = turns
            .iter()
            .map(|t| format!("[{}]: {}", t.role.as_str(), t.text))
            .collect::<Vec<_>>()
            .join("\n");
        let limit = if max_sentences == 1 {
            "one sentence".to_string()
        } else {
            format!("at most {} sentences", max_sentences)
        };

        match previous {
            Some(summary) => format!(
                "You maintain the memory of a conversation between a user and their virtual pet.\n\
                 Fold the new messages into the existing summary and reply with the updated summary only, in {limit}.\n\
                 Keep names, preferences and promises; drop small talk.\n\n\
                 Existing summary:\n{summary}\n\n\
                 New messages:\n{transcript}"
            ),
            None => format!(
                "You maintain the memory of a conversation between a user and their virtual pet.\n\
                 Summarize the messages below in {limit} and reply with the summary only.\n\
                 Keep names, preferences and promises; drop small talk.\n\n\
                 Messages:\n{transcript}"
            ),
        }
    }
}

/// 用闭包自定义提示词的便捷包装
///
/// ```rust
/// use pet_companion::compression::FnSummaryPrompt;
///
/// let prompt = FnSummaryPrompt(|previous: Option<&str>, turns: &[pet_companion::memory::Turn], n: usize| {
///     format!("{:?} + {} turns in {} sentences", previous, turns.len(), n)
/// });
/// # let _ = prompt;
/// ```
pub struct FnSummaryPrompt<F>(pub F)
where
    F: Fn(Option<&str>, &[Turn], usize) -> String + Send + Sync;

impl<F> SummaryPromptBuilder for FnSummaryPrompt<F>
where
    F: Fn(Option<&str>, &[Turn], usize) -> String + Send + Sync,
{
    fn build(&self, previous: Option<&str>, turns: &[Turn], max_sentences: usize) -> String {
        (self.0)(previous, turns, max_sentences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Role;

    fn turns() -> Vec<Turn> {
        vec![
            Turn {
                role: Role::User,
                text: "My name is Alice".to_string(),
                sequence: 1,
                created_at: 0,
            },
            Turn {
                role: Role::Assistant,
                text: "Hi Alice!".to_string(),
                sequence: 2,
                created_at: 0,
            },
        ]
    }

    #[test]
    fn test_default_prompt_without_previous() {
        let prompt = DefaultSummaryPrompt.build(None, &turns(), 2);
        assert!(prompt.contains("at most 2 sentences"));
        assert!(prompt.contains("[user]: My name is Alice"));
        assert!(prompt.contains("[assistant]: Hi Alice!"));
        assert!(!prompt.contains("Existing summary"));
    }

    #[test]
    fn test_default_prompt_folds_previous() {
        let prompt = DefaultSummaryPrompt.build(Some("Alice adopted a dragon."), &turns(), 1);
        assert!(prompt.contains("one sentence"));
        assert!(prompt.contains("Existing summary:\nAlice adopted a dragon."));
    }

    #[test]
    fn test_fn_prompt() {
        let prompt = FnSummaryPrompt(|prev: Option<&str>, t: &[Turn], n: usize| {
            format!("{}|{}|{}", prev.unwrap_or("-"), t.len(), n)
        });
        assert_eq!(prompt.build(None, &turns(), 3), "-|2|3");
    }
}
