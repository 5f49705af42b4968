//! 上下文策略配置
//!
//! 支持两种来源：
//!
//! - YAML 文件（[`ContextConfig::load`]），缺省字段使用默认值
//! - 环境变量（[`ContextConfig::from_env`]），会先加载 `.env`
//!
//! ```text
//! SUMMARY_THRESHOLD=20
//! WINDOW=10
//! SUMMARY_MAX_SENTENCES=2
//! GENERATION_TIMEOUT_MS=30000
//! SUMMARY_TIMEOUT_MS=20000
//! ```

use crate::error::{ConfigError, Result};
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// 摘要压缩与上下文窗口的策略参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// 历史条数超过该值后才允许压缩
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold: usize,
    /// 始终原样保留、永不进入摘要的最近条数
    #[serde(default = "default_window")]
    pub window: usize,
    /// 摘要最多几句话
    #[serde(default = "default_summary_max_sentences")]
    pub summary_max_sentences: usize,
    /// 回复生成超时（毫秒）
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,
    /// 摘要生成超时（毫秒）
    #[serde(default = "default_summary_timeout_ms")]
    pub summary_timeout_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            summary_threshold: default_summary_threshold(),
            window: default_window(),
            summary_max_sentences: default_summary_max_sentences(),
            generation_timeout_ms: default_generation_timeout_ms(),
            summary_timeout_ms: default_summary_timeout_ms(),
        }
    }
}

impl ContextConfig {
    /// 从 YAML 文件加载并校验
    pub fn load(path: &str) -> Result<Self> {
        let file =
            std::fs::File::open(path).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        let config: ContextConfig = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// 从环境变量加载，未设置的项使用默认值
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 从任意键值来源加载，`lookup` 返回 `None` 的项使用默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            summary_threshold: value_or(&lookup, "SUMMARY_THRESHOLD", defaults.summary_threshold)?,
            window: value_or(&lookup, "WINDOW", defaults.window)?,
            summary_max_sentences: value_or(
                &lookup,
                "SUMMARY_MAX_SENTENCES",
                defaults.summary_max_sentences,
            )?,
            generation_timeout_ms: value_or(
                &lookup,
                "GENERATION_TIMEOUT_MS",
                defaults.generation_timeout_ms,
            )?,
            summary_timeout_ms: value_or(
                &lookup,
                "SUMMARY_TIMEOUT_MS",
                defaults.summary_timeout_ms,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(invalid("window", "must be at least 1"));
        }
        if self.summary_max_sentences == 0 {
            return Err(invalid("summary_max_sentences", "must be at least 1"));
        }
        if self.summary_threshold < self.window {
            return Err(invalid(
                "summary_threshold",
                "must not be smaller than window",
            ));
        }
        Ok(())
    }

    pub fn summary_threshold(mut self, threshold: usize) -> Self {
        self.summary_threshold = threshold;
        self
    }

    pub fn window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn summary_max_sentences(mut self, sentences: usize) -> Self {
        self.summary_max_sentences = sentences;
        self
    }

    pub fn generation_timeout_ms(mut self, ms: u64) -> Self {
        self.generation_timeout_ms = ms;
        self
    }

    pub fn summary_timeout_ms(mut self, ms: u64) -> Self {
        self.summary_timeout_ms = ms;
        self
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn summary_timeout(&self) -> Duration {
        Duration::from_millis(self.summary_timeout_ms)
    }
}

fn value_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(name, &format!("cannot parse '{}'", raw))),
        None => Ok(default),
    }
}

fn invalid(field: &str, message: &str) -> crate::error::CompanionError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn default_summary_threshold() -> usize {
    20
}

fn default_window() -> usize {
    10
}

fn default_summary_max_sentences() -> usize {
    2
}

fn default_generation_timeout_ms() -> u64 {
    30_000
}

fn default_summary_timeout_ms() -> u64 {
    20_000
}
