use crate::error::{CompanionError, LlmError, Result};
use crate::llm::config::ModelConfig;
use crate::llm::types::{ChatCompletionRequest, ChatCompletionResponse};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::time::Instant;
use tracing::debug;

/// 错误响应体在日志和错误信息中保留的最大字符数
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn request_headers(model: &ModelConfig) -> Result<HeaderMap> {
    let bearer = HeaderValue::from_str(&format!("Bearer {}", model.apikey))
        .map_err(|e| CompanionError::Other(format!("Invalid Authorization header: {}", e)))?;
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

fn status_error(status: u16, body: &str) -> LlmError {
    let message: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
    LlmError::ApiError {
        status,
        message: if message.is_empty() {
            "Unknown error".to_string()
        } else {
            message
        },
    }
}

/// 向模型的 Chat Completions 接口发送一次非流式请求
pub(crate) async fn send_completion(
    client: &Client,
    model: &ModelConfig,
    body: &ChatCompletionRequest,
) -> Result<ChatCompletionResponse> {
    let started = Instant::now();
    let response = client
        .post(&model.baseurl)
        .headers(request_headers(model)?)
        .json(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(status_error(status.as_u16(), &text).into());
    }

    let completion = response
        .json::<ChatCompletionResponse>()
        .await
        .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

    debug!(
        model = %body.model,
        messages = body.messages.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        usage = ?completion.usage,
        "completion received"
    );
    Ok(completion)
}
