//! Anthropic Claude provider implementation

use super::types::*;
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic service implementation
pub struct AnthropicService {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicService {
    pub fn new(api_key: String, model: String, base_url: Option<&str>) -> Result<Self, LlmError> {
        let base_url = match base_url {
            Some(url) => format!("{}/v1/messages", url.trim_end_matches('/')),
            None => DEFAULT_BASE_URL.to_string(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> AnthropicRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| AnthropicMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system.clone(),
            messages,
        }
    }

    fn normalize_response(resp: AnthropicResponse) -> LlmResponse {
        let text = resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        LlmResponse {
            text,
            end_turn: resp.stop_reason.as_deref() == Some("end_turn"),
            usage: Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
            },
        }
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/message"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or(body);

        let err = LlmError::from_status(status.as_u16(), message);
        match parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/retry_after"))
            .and_then(serde_json::Value::as_f64)
        {
            Some(secs) if status.as_u16() == 429 => {
                err.with_retry_after(Duration::from_secs_f64(secs))
            }
            _ => err,
        }
    }
}

#[async_trait]
impl LlmService for AnthropicService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let anthropic_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body));
        }

        let anthropic_response: AnthropicResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Ok(Self::normalize_response(anthropic_response))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmErrorKind;
    use serde_json::json;

    fn service() -> AnthropicService {
        AnthropicService::new("key".to_string(), "claude-3-5-sonnet-20240620".to_string(), None)
            .unwrap()
    }

    #[test]
    fn test_translate_request_puts_system_at_top_level() {
        let request = LlmRequest::new(
            "be terse",
            vec![LlmMessage::user("hi"), LlmMessage::assistant("hello")],
        );
        let body = serde_json::to_value(service().translate_request(&request)).unwrap();

        assert_eq!(body["system"], "be terse");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(
            body["messages"],
            json!([
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": "hello" }
            ])
        );
    }

    #[test]
    fn test_normalize_response_joins_text_blocks() {
        let resp: AnthropicResponse = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "FINAL ANSWER: " },
                { "type": "tool_use", "id": "x", "name": "y", "input": {} },
                { "type": "text", "text": "Paris" }
            ],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 10, "output_tokens": 3 }
        }))
        .unwrap();

        let normalized = AnthropicService::normalize_response(resp);
        assert_eq!(normalized.text, "FINAL ANSWER: Paris");
        assert!(normalized.end_turn);
        assert_eq!(normalized.usage.output_tokens, 3);
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let body = r#"{"error":{"message":"slow down","retry_after":2.5}}"#;
        let err = AnthropicService::classify_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(err.kind, LlmErrorKind::RateLimit);
        assert_eq!(err.retry_after, Some(Duration::from_millis(2500)));
        assert!(err.message.contains("slow down"));
    }

    #[test]
    fn test_base_url_override() {
        let svc = AnthropicService::new("k".to_string(), "m".to_string(), Some("http://localhost:9/"))
            .unwrap();
        assert_eq!(svc.base_url, "http://localhost:9/v1/messages");
    }
}
