use std::fmt;

/// 宠物对话项目的统一错误类型
#[derive(Debug)]
pub enum CompanionError {
    /// 请求字段缺失或格式错误（发生在任何 IO 之前）
    Validation(ValidationError),
    /// 调用方身份未通过校验
    Auth(String),
    /// 历史 / 摘要 / 用户资料存储错误
    Store(StoreError),
    /// 摘要压缩失败（永远不会影响当前回复）
    Summarization(String),
    /// LLM 相关错误
    Llm(LlmError),
    /// 配置错误
    Config(ConfigError),
    /// IO 错误
    Io(std::io::Error),
    /// 其他错误
    Other(String),
}

/// 请求校验错误
#[derive(Debug)]
pub enum ValidationError {
    /// 必填字段缺失或为空白
    MissingField(&'static str),
}

/// 存储错误
#[derive(Debug)]
pub enum StoreError {
    /// 文件读写失败
    Io(String),
    /// 序列化/反序列化失败
    Serialization(String),
    /// 存储后端不可用
    Unavailable(String),
}

/// LLM 相关错误
#[derive(Debug)]
pub enum LlmError {
    /// 网络请求失败
    NetworkError(String),
    /// API 返回错误状态码
    ApiError { status: u16, message: String },
    /// 响应格式无效
    InvalidResponse(String),
    /// 没有返回内容
    EmptyResponse,
    /// 调用超时（毫秒）
    Timeout(u64),
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),
    /// 配置解析失败
    ParseFailed(String),
    /// 缺少必需的配置项
    MissingField(String),
    /// 配置值无效
    InvalidValue { field: String, message: String },
    /// 环境变量格式不符合 `COMPANION_MODEL_<ID>_<KEY>`
    EnvFormatError(String),
    /// 未知的模型配置项
    UnknownKey { key: String, env: String },
    /// 模型缺少某个配置项
    MissingModelField { model: String, field: String },
    /// 未找到指定模型
    ModelNotFound(String),
}

/// 对外暴露的错误类别，具体的传输层状态码由 HTTP 绑定层决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Auth,
    Upstream,
}

impl CompanionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CompanionError::Validation(_) => ErrorCategory::Validation,
            CompanionError::Auth(_) => ErrorCategory::Auth,
            _ => ErrorCategory::Upstream,
        }
    }
}

// 实现 Display trait
impl fmt::Display for CompanionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompanionError::Validation(e) => write!(f, "Validation Error: {}", e),
            CompanionError::Auth(msg) => write!(f, "Auth Error: {}", msg),
            CompanionError::Store(e) => write!(f, "Store Error: {}", e),
            CompanionError::Summarization(msg) => write!(f, "Summarization Error: {}", msg),
            CompanionError::Llm(e) => write!(f, "LLM Error: {}", e),
            CompanionError::Config(e) => write!(f, "Config Error: {}", e),
            CompanionError::Io(e) => write!(f, "IO Error: {}", e),
            CompanionError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField(field) => write!(f, "Missing {}", field),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(msg) => write!(f, "IO failure: {}", msg),
            StoreError::Serialization(msg) => write!(f, "Serialization failure: {}", msg),
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
        }
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            LlmError::ApiError { status, message } => {
                write!(f, "API error (status {}): {}", status, message)
            }
            LlmError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            LlmError::EmptyResponse => write!(f, "Empty response from LLM"),
            LlmError::Timeout(ms) => write!(f, "LLM call timed out after {}ms", ms),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseFailed(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::MissingField(field) => write!(f, "Missing config field: {}", field),
            ConfigError::InvalidValue { field, message } => {
                write!(f, "Invalid config value for '{}': {}", field, message)
            }
            ConfigError::EnvFormatError(key) => {
                write!(f, "Malformed model env var '{}'", key)
            }
            ConfigError::UnknownKey { key, env } => {
                write!(f, "Unknown model config key '{}' in '{}'", key, env)
            }
            ConfigError::MissingModelField { model, field } => {
                write!(f, "Model '{}' is missing '{}'", model, field)
            }
            ConfigError::ModelNotFound(model) => write!(f, "Model '{}' not configured", model),
        }
    }
}

// 实现 std::error::Error trait
impl std::error::Error for CompanionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompanionError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ValidationError {}
impl std::error::Error for StoreError {}
impl std::error::Error for LlmError {}
impl std::error::Error for ConfigError {}

// From 转换实现
impl From<std::io::Error> for CompanionError {
    fn from(err: std::io::Error) -> Self {
        CompanionError::Io(err)
    }
}

impl From<reqwest::Error> for CompanionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CompanionError::Llm(LlmError::NetworkError("Request timeout".to_string()))
        } else if err.is_connect() {
            CompanionError::Llm(LlmError::NetworkError(format!(
                "Connection failed: {}",
                err
            )))
        } else {
            CompanionError::Llm(LlmError::NetworkError(err.to_string()))
        }
    }
}

impl From<serde_json::Error> for CompanionError {
    fn from(err: serde_json::Error) -> Self {
        CompanionError::Store(StoreError::Serialization(err.to_string()))
    }
}

impl From<serde_yaml::Error> for CompanionError {
    fn from(err: serde_yaml::Error) -> Self {
        CompanionError::Config(ConfigError::ParseFailed(err.to_string()))
    }
}

impl From<ValidationError> for CompanionError {
    fn from(err: ValidationError) -> Self {
        CompanionError::Validation(err)
    }
}

impl From<StoreError> for CompanionError {
    fn from(err: StoreError) -> Self {
        CompanionError::Store(err)
    }
}

impl From<LlmError> for CompanionError {
    fn from(err: LlmError) -> Self {
        CompanionError::Llm(err)
    }
}

impl From<ConfigError> for CompanionError {
    fn from(err: ConfigError) -> Self {
        CompanionError::Config(err)
    }
}

// 便捷的 Result 类型别名
pub type Result<T> = std::result::Result<T, CompanionError>;
