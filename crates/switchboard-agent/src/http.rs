use crate::config::HttpBackendConfig;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use switchboard_core::{Completion, CompletionService, SwitchboardError, SwitchboardResult};
use tracing::{debug, warn};

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that implements `/v1/chat/completions`. The
/// request context is sent as the system message and the prompt as the
/// user message.
pub struct HttpCompletionService {
    config: HttpBackendConfig,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpCompletionService {
    pub fn new(config: HttpBackendConfig) -> SwitchboardResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SwitchboardError::Config(format!("HTTP client: {e}")))?;
        let api_key = config.resolve_api_key();
        Ok(Self {
            config,
            api_key,
            http,
        })
    }

    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    fn build_messages(&self, prompt: &str, context: &serde_json::Value) -> Vec<serde_json::Value> {
        let mut messages = Vec::with_capacity(2);
        if !context.is_null() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": context.to_string(),
            }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": prompt,
        }));
        messages
    }
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    async fn complete(&self, prompt: &str, context: &serde_json::Value) -> SwitchboardResult<Completion> {
        let url = self.config.completions_url();
        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": self.build_messages(prompt, context),
        });

        let mut request = self.http.post(&url).header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let started = Instant::now();
        let resp = request.json(&body).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Completion request failed");
            SwitchboardError::Upstream(if e.is_timeout() {
                format!("completion timed out after {}ms", self.config.timeout_ms)
            } else {
                e.to_string()
            })
        })?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(SwitchboardError::Upstream(format!(
                "completion API error {}: {}",
                status, error_body
            )));
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SwitchboardError::Upstream(format!("invalid completion response: {e}")))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (text, tokens_used) = parse_chat_response(&resp_body)?;
        debug!(model = %self.config.model_id, tokens_used, latency_ms, "Completion received");
        Ok(Completion {
            text,
            tokens_used,
            latency_ms,
        })
    }
}

/// Extract `choices[0].message.content` and `usage.total_tokens`.
pub fn parse_chat_response(body: &serde_json::Value) -> SwitchboardResult<(String, u64)> {
    let text = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| SwitchboardError::Upstream("response missing choices[0].message.content".into()))?
        .to_string();
    let tokens = body["usage"]["total_tokens"].as_u64().unwrap_or(0);
    Ok((text, tokens))
}
