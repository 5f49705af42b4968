//! LLM 配置加载
//!
//! 从环境变量读取模型配置，格式：
//! ```text
//! COMPANION_MODEL_<ID>_MODEL=gpt-4o-mini
//! COMPANION_MODEL_<ID>_BASEURL=https://api.openai.com/v1/chat/completions
//! COMPANION_MODEL_<ID>_APIKEY=sk-...
//! ```
//! `<ID>` 为自定义标识（如 `OPENAI`、`QWEN`），不区分大小写。
//!
//! 加载结果按值返回，由调用方显式传给 [`DefaultLlmClient`](crate::llm::DefaultLlmClient)，
//! 不存在进程级共享的客户端或凭据缓存。

use crate::error::{ConfigError, Result};
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const PREFIX: &str = "COMPANION_MODEL_";

/// 单个模型的连接配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// LLM 接口中使用的模型名（如 `gpt-4o-mini`）
    pub model: String,
    /// Chat Completions 接口完整 URL
    pub baseurl: String,
    pub apikey: String,
}

/// 已加载的模型配置表（key = 小写的 `<ID>`）
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub models: HashMap<String, ModelConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut model_configs: HashMap<String, HashMap<String, String>> = HashMap::new();
        for (key, value) in vars {
            let Some(suffix) = key.strip_prefix(PREFIX) else {
                continue;
            };
            let parts: Vec<&str> = suffix.split('_').collect();
            if parts.len() != 2 {
                return Err(ConfigError::EnvFormatError(key).into());
            }
            let model_id = parts[0].to_lowercase();
            let config_key = parts[1].to_lowercase();

            match config_key.as_str() {
                "model" | "baseurl" | "apikey" => {}
                _ => {
                    return Err(ConfigError::UnknownKey {
                        key: config_key,
                        env: key,
                    }
                    .into());
                }
            }
            model_configs
                .entry(model_id)
                .or_default()
                .insert(config_key, value);
        }

        let mut models = HashMap::new();
        for (model_id, mut config_map) in model_configs {
            let mut take = |field: &str| {
                config_map
                    .remove(field)
                    .ok_or_else(|| ConfigError::MissingModelField {
                        model: model_id.clone(),
                        field: field.to_string(),
                    })
            };
            let model = take("model")?;
            let baseurl = take("baseurl")?;
            let apikey = take("apikey")?;
            models.insert(
                model_id.clone(),
                ModelConfig {
                    model,
                    baseurl,
                    apikey,
                },
            );
        }

        Ok(Self { models })
    }

    pub fn get_model(&self, id: &str) -> Result<ModelConfig> {
        self.models
            .get(&id.to_lowercase())
            .cloned()
            .ok_or_else(|| ConfigError::ModelNotFound(id.to_string()).into())
    }
}
