//! Tool capabilities available to the expert
//!
//! Tools take a raw input string and return a raw output string. The
//! registry is assembled once from capability providers; a provider that
//! cannot be constructed is logged and left out.

mod search;
mod wikipedia;
mod wolfram;

pub use search::SearchTool;
pub use wikipedia::WikipediaTool;
pub use wolfram::WolframAlphaTool;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by tool implementations
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("{tool} failed: {source}")]
    Execution {
        tool: String,
        #[source]
        source: BoxError,
    },
    #[error("{tool} unavailable: {reason}")]
    Unavailable { tool: String, reason: String },
}

/// A named capability the expert can call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// One-line description for prompts and the tools listing
    fn description(&self) -> String;

    /// Run the tool on raw input text
    async fn run(&self, input: &str) -> Result<String, BoxError>;
}

/// Credentials and limits for the built-in tools
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub tavily_api_key: Option<String>,
    pub wolfram_alpha_appid: Option<String>,
    pub search_max_results: u32,
    pub timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            tavily_api_key: None,
            wolfram_alpha_appid: None,
            search_max_results: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ToolConfig {
    pub fn from_env() -> Self {
        let non_empty = |var: &str| std::env::var(var).ok().filter(|v| !v.trim().is_empty());
        Self {
            tavily_api_key: non_empty("TAVILY_API_KEY"),
            wolfram_alpha_appid: non_empty("WOLFRAM_ALPHA_APPID"),
            ..Self::default()
        }
    }
}

/// Result of constructing one capability provider
pub type ProviderResult = Result<Arc<dyn Tool>, ToolError>;

/// Build an HTTP client for a tool, reporting failure as unavailability
pub(crate) fn http_client(tool: &str, timeout: Duration) -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("meta_prompter/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ToolError::Unavailable {
            tool: tool.to_string(),
            reason: e.to_string(),
        })
}

/// Collection of tools, keyed by name
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Keep the providers that constructed successfully
    pub fn from_providers(providers: impl IntoIterator<Item = ProviderResult>) -> Self {
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        for provider in providers {
            match provider {
                Ok(tool) => {
                    if tools.iter().any(|t| t.name() == tool.name()) {
                        tracing::warn!(tool = %tool.name(), "Duplicate tool name, keeping the first");
                        continue;
                    }
                    tracing::info!(tool = %tool.name(), "Tool registered");
                    tools.push(tool);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping tool");
                }
            }
        }
        Self { tools }
    }

    /// Standard tool set: search, Wolfram|Alpha, Wikipedia
    pub fn standard(config: &ToolConfig) -> Self {
        Self::from_providers([
            SearchTool::provider(config),
            WolframAlphaTool::provider(config),
            WikipediaTool::provider(config),
        ])
    }

    #[allow(dead_code)] // Used in tests
    pub fn empty() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// `(name, description)` pairs in registration order
    pub fn describe(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|t| (t.name().to_string(), t.description()))
            .collect()
    }

    /// Resolve a tool by name and run it
    pub async fn invoke(&self, name: &str, input: &str) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tracing::info!(tool = %name, input_len = input.len(), "Using tool");
        tool.run(input).await.map_err(|source| ToolError::Execution {
            tool: name.to_string(),
            source,
        })
    }
}
