use std::time::Duration;

use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    StatusCode,
};
use serde_json::{json, Value};

use crate::{
    config::FetchConfig,
    error::FetchError,
    models::{Dialect, Provider},
    telemetry,
};

const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/**
 * \brief 单次请求失败的结果，区分是否值得重试。
 */
enum Attempt {
    Retry(String),
    Fail(FetchError),
}

/**
 * \brief 向 Provider 发送提示词并返回原始文本。
 * \details 带超时；网络失败、429、5xx 时按配置重试，仍失败则返回 `FetchError::Provider`。
 */
pub async fn invoke(
    provider: &Provider,
    prompt: &str,
    config: &FetchConfig,
) -> Result<String, FetchError> {
    if !provider.has_credential() {
        return Err(FetchError::NoActiveProvider);
    }
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| FetchError::Provider(format!("build client failed: {}", e)))?;

    let mut attempt = 0;
    loop {
        match send_once(&client, provider, prompt).await {
            Ok(text) => return Ok(text),
            Err(Attempt::Retry(message)) if attempt < config.retries => {
                attempt += 1;
                telemetry::log_warn(
                    "llm.invoke",
                    &format!(
                        "provider={} retry {}/{}: {}",
                        provider.name, attempt, config.retries, message
                    ),
                );
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
            Err(Attempt::Retry(message)) => return Err(FetchError::Provider(message)),
            Err(Attempt::Fail(err)) => return Err(err),
        }
    }
}

async fn send_once(
    client: &reqwest::Client,
    provider: &Provider,
    prompt: &str,
) -> Result<String, Attempt> {
    let request = match provider.dialect {
        Dialect::ChatCompletions => client
            .post(chat_completions_url(&provider.api_base))
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", provider.api_key))
            .json(&chat_completions_body(&provider.model, prompt)),
        Dialect::GenerateContent => client
            .post(generate_content_url(&provider.api_base, &provider.model))
            .query(&[("key", provider.api_key.as_str())])
            .header(CONTENT_TYPE, "application/json")
            .json(&generate_content_body(prompt)),
    };

    let resp = request
        .send()
        .await
        .map_err(|e| Attempt::Retry(format!("request failed: {}", e)))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = format!("request failed: {} -> {}", status, text);
        return Err(if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Attempt::Retry(message)
        } else {
            Attempt::Fail(FetchError::Provider(message))
        });
    }

    let v: Value = resp
        .json()
        .await
        .map_err(|e| Attempt::Fail(FetchError::Provider(format!("invalid envelope: {}", e))))?;
    let text = match provider.dialect {
        Dialect::ChatCompletions => extract_chat_content(&v),
        Dialect::GenerateContent => extract_gemini_content(&v),
    };
    text.filter(|t| !t.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| Attempt::Fail(FetchError::Provider("empty response".to_string())))
}

/**
 * \brief 拼接 chat/completions 地址，去除多余斜杠。
 */
pub fn chat_completions_url(api_base: &str) -> String {
    format!("{}/chat/completions", api_base.trim_end_matches('/'))
}

/**
 * \brief 拼接 {base}/{model}:generateContent 地址，密钥以 query 参数附加。
 */
pub fn generate_content_url(api_base: &str, model: &str) -> String {
    format!(
        "{}/{}:generateContent",
        api_base.trim_end_matches('/'),
        model.trim_matches('/')
    )
}

fn chat_completions_body(model: &str, prompt: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
        "response_format": {"type": "json_object"},
        "stream": false
    })
}

fn generate_content_body(prompt: &str) -> Value {
    json!({
        "contents": [{"parts": [{"text": prompt}]}],
        "generationConfig": {"responseMimeType": "application/json"}
    })
}

fn extract_chat_content(v: &Value) -> Option<&str> {
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

fn extract_gemini_content(v: &Value) -> Option<&str> {
    v.get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
}
