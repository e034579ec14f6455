//! Wolfram|Alpha short answers

use super::{http_client, BoxError, ProviderResult, Tool, ToolConfig, ToolError};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;

const WOLFRAM_URL: &str = "https://api.wolframalpha.com/v1/result";

pub struct WolframAlphaTool {
    client: reqwest::Client,
    appid: String,
}

impl WolframAlphaTool {
    /// Only available when `WOLFRAM_ALPHA_APPID` is configured
    pub fn provider(config: &ToolConfig) -> ProviderResult {
        let appid = config
            .wolfram_alpha_appid
            .clone()
            .ok_or_else(|| ToolError::Unavailable {
                tool: "wolfram_alpha".to_string(),
                reason: "WOLFRAM_ALPHA_APPID not set".to_string(),
            })?;
        Ok(Arc::new(Self {
            client: http_client("wolfram_alpha", config.timeout)?,
            appid,
        }))
    }
}

fn interpret(status: StatusCode, body: String) -> Result<String, BoxError> {
    match status {
        StatusCode::OK => Ok(body),
        // 501: the query was understood but has no short answer
        StatusCode::NOT_IMPLEMENTED => Ok("Wolfram Alpha wasn't able to answer it".to_string()),
        _ => Err(format!("Wolfram Alpha returned HTTP {status}: {body}").into()),
    }
}

#[async_trait]
impl Tool for WolframAlphaTool {
    fn name(&self) -> &'static str {
        "wolfram_alpha"
    }

    fn description(&self) -> String {
        "A wrapper around Wolfram Alpha. Useful for answering questions about Math, Science, \
         Technology, Culture, Society and Everyday Life. Input should be a search query."
            .to_string()
    }

    async fn run(&self, input: &str) -> Result<String, BoxError> {
        let response = self
            .client
            .get(WOLFRAM_URL)
            .query(&[("appid", self.appid.as_str()), ("i", input.trim())])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        interpret(status, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_answer() {
        assert_eq!(interpret(StatusCode::OK, "42".to_string()).unwrap(), "42");
    }

    #[test]
    fn test_interpret_no_short_answer() {
        let out = interpret(StatusCode::NOT_IMPLEMENTED, "No short answer available".to_string())
            .unwrap();
        assert!(out.contains("wasn't able to answer"));
    }

    #[test]
    fn test_interpret_bad_appid() {
        let err = interpret(StatusCode::FORBIDDEN, "Invalid appid".to_string()).unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn test_provider_is_optional() {
        assert!(WolframAlphaTool::provider(&ToolConfig::default()).is_err());
        let config = ToolConfig {
            wolfram_alpha_appid: Some("APPID".to_string()),
            ..ToolConfig::default()
        };
        assert!(WolframAlphaTool::provider(&config).is_ok());
    }
}
