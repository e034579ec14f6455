//! Web search through the Tavily API

use super::{http_client, BoxError, ProviderResult, Tool, ToolConfig, ToolError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const TAVILY_URL: &str = "https://api.tavily.com/search";

pub struct SearchTool {
    client: reqwest::Client,
    api_key: String,
    max_results: u32,
}

impl SearchTool {
    pub fn provider(config: &ToolConfig) -> ProviderResult {
        let api_key = config
            .tavily_api_key
            .clone()
            .ok_or_else(|| ToolError::Unavailable {
                tool: "search".to_string(),
                reason: "TAVILY_API_KEY not set".to_string(),
            })?;
        Ok(Arc::new(Self {
            client: http_client("search", config.timeout)?,
            api_key,
            max_results: config.search_max_results,
        }))
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SearchResult {
    url: String,
    content: String,
}

/// Render results as the compact JSON list the expert sees
fn format_results(body: &str) -> Result<String, BoxError> {
    let response: SearchResponse = serde_json::from_str(body)?;
    if response.results.is_empty() {
        return Ok("No search results found.".to_string());
    }
    Ok(serde_json::to_string(&response.results)?)
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> String {
        "A search engine optimized for comprehensive, accurate, and trusted results. \
         Useful for answering questions about current events. Input should be a search query."
            .to_string()
    }

    async fn run(&self, input: &str) -> Result<String, BoxError> {
        let request = SearchRequest {
            api_key: &self.api_key,
            query: input.trim(),
            max_results: self.max_results,
        };
        let response = self.client.post(TAVILY_URL).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(format!("Tavily returned HTTP {status}: {body}").into());
        }
        format_results(&body)
    }
}
