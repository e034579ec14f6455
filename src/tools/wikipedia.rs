//! Wikipedia search with page summaries

use super::{http_client, BoxError, ProviderResult, Tool, ToolConfig};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const WIKIPEDIA_API: &str = "https://en.wikipedia.org/w/api.php";
const TOP_K_RESULTS: u32 = 3;
const MAX_OUTPUT_CHARS: usize = 4000;
const NO_RESULT: &str = "No good Wikipedia Search Result was found";

pub struct WikipediaTool {
    client: reqwest::Client,
}

impl WikipediaTool {
    pub fn provider(config: &ToolConfig) -> ProviderResult {
        Ok(Arc::new(Self {
            client: http_client("wikipedia", config.timeout)?,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    /// Search rank
    #[serde(default)]
    index: u32,
    #[serde(default)]
    extract: String,
}

fn format_pages(body: &str) -> Result<String, BoxError> {
    let response: QueryResponse = serde_json::from_str(body)?;
    let mut pages = response.query.map(|q| q.pages).unwrap_or_default();
    if pages.is_empty() {
        return Ok(NO_RESULT.to_string());
    }
    pages.sort_by_key(|p| p.index);

    let summaries = pages
        .iter()
        .filter(|p| !p.extract.trim().is_empty())
        .map(|p| format!("Page: {}\nSummary: {}", p.title, p.extract.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    if summaries.is_empty() {
        return Ok(NO_RESULT.to_string());
    }
    Ok(summaries.chars().take(MAX_OUTPUT_CHARS).collect())
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    fn description(&self) -> String {
        "Useful for querying Wikipedia to get information on a wide range of topics.".to_string()
    }

    async fn run(&self, input: &str) -> Result<String, BoxError> {
        let limit = TOP_K_RESULTS.to_string();
        let response = self
            .client
            .get(WIKIPEDIA_API)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("generator", "search"),
                ("gsrsearch", input.trim()),
                ("gsrlimit", limit.as_str()),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("exlimit", "max"),
                ("redirects", "1"),
            ])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(format!("Wikipedia returned HTTP {status}").into());
        }
        format_pages(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_are_ordered_by_rank() {
        let body = r#"{
            "batchcomplete": true,
            "query": {"pages": [
                {"pageid": 2, "title": "Paris Commune", "index": 2, "extract": "A revolutionary government."},
                {"pageid": 1, "title": "Paris", "index": 1, "extract": "Paris is the capital of France."}
            ]}
        }"#;
        let out = format_pages(body).unwrap();
        assert_eq!(
            out,
            "Page: Paris\nSummary: Paris is the capital of France.\n\n\
             Page: Paris Commune\nSummary: A revolutionary government."
        );
    }

    #[test]
    fn test_no_query_means_no_result() {
        assert_eq!(format_pages(r#"{"batchcomplete": true}"#).unwrap(), NO_RESULT);
    }

    #[test]
    fn test_output_is_capped() {
        let long = "é".repeat(MAX_OUTPUT_CHARS * 2);
        let body = serde_json::json!({
            "query": { "pages": [ { "title": "Long", "index": 1, "extract": long } ] }
        })
        .to_string();
        let out = format_pages(&body).unwrap();
        assert_eq!(out.chars().count(), MAX_OUTPUT_CHARS);
    }
}
