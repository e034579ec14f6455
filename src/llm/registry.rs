//! Provider selection for the language model

use super::{AnthropicService, LlmError, LlmService, LoggingService, OpenAIService};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    OpenAI,
    Anthropic,
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-4o-mini",
            Provider::Anthropic => "claude-3-5-sonnet-20240620",
        }
    }

    fn api_key_var(self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(LlmError::invalid_request(format!(
                "Unsupported LLM provider: {other}"
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAI => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Configuration for the LLM provider
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// Override for the provider endpoint root (proxies, local servers)
    pub base_url: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            provider: std::env::var("LLM_PROVIDER").ok(),
            model: std::env::var("LLM_MODEL").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            base_url: std::env::var("LLM_BASE_URL").ok(),
        }
    }

    pub fn provider(&self) -> Result<Provider, LlmError> {
        self.provider
            .as_deref()
            .map_or(Ok(Provider::default()), str::parse)
    }

    fn api_key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::OpenAI => self.openai_api_key.as_deref(),
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
        }
        .filter(|k| !k.is_empty())
    }
}

/// Build the configured service, wrapped with request logging
pub fn build_service(config: &LlmConfig) -> Result<Arc<dyn LlmService>, LlmError> {
    let provider = config.provider()?;
    let api_key = config
        .api_key(provider)
        .ok_or_else(|| LlmError::auth(format!("{} is not set", provider.api_key_var())))?
        .to_string();
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| provider.default_model().to_string());
    let base_url = config.base_url.as_deref();

    let service: Arc<dyn LlmService> = match provider {
        Provider::OpenAI => Arc::new(OpenAIService::new(api_key, model, base_url)?),
        Provider::Anthropic => Arc::new(AnthropicService::new(api_key, model, base_url)?),
    };

    tracing::info!(provider = %provider, model = %service.model_id(), "LLM provider configured");
    Ok(Arc::new(LoggingService::new(service)))
}
