//! # Web Search
//!
//! Search augmentation for generation requests: the [`SearchProvider`]
//! trait plus a Brave Search API client. Search is strictly best-effort at
//! the orchestrator level; this module just performs the query and reports
//! failures honestly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Brave caps query length; longer queries are truncated, not rejected.
pub const MAX_QUERY_LENGTH: usize = 400;

/// Default Brave Search API endpoint.
pub const DEFAULT_BRAVE_BASE_URL: &str = "https://api.search.brave.com";

/// A single web search result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Result page title.
    pub title: String,
    /// Result URL.
    pub url: String,
    /// Short description or snippet.
    pub snippet: String,
}

/// Errors from search operations.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// HTTP request failed.
    #[error("search HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Search API returned a non-success status.
    #[error("search API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or description.
        message: String,
    },
}

/// Web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a web search, returning up to `max_results` results.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

/// Brave Search API client.
pub struct BraveSearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl BraveSearch {
    /// Create a client against the public Brave endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BRAVE_BASE_URL)
    }

    /// Create a client against a custom endpoint (used in tests).
    #[must_use]
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

/// Subset of the Brave response we care about.
#[derive(Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: BraveWeb,
}

#[derive(Deserialize, Default)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl SearchProvider for BraveSearch {
    #[instrument(skip(self))]
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let query = truncate_query(query);
        let url = format!("{}/res/v1/web/search", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", &max_results.to_string())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: BraveResponse = response.json().await?;
        let results: Vec<SearchResult> = body
            .web
            .results
            .into_iter()
            .take(max_results)
            .map(|r| SearchResult {
                title: r.title,
                url: r.url,
                snippet: r.description,
            })
            .collect();
        debug!(count = results.len(), "search complete");
        Ok(results)
    }
}

/// Truncate a query to the API limit on a char boundary.
fn truncate_query(query: &str) -> &str {
    if query.len() <= MAX_QUERY_LENGTH {
        return query;
    }
    let mut end = MAX_QUERY_LENGTH;
    while !query.is_char_boundary(end) {
        end -= 1;
    }
    &query[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> BraveSearch {
        BraveSearch::with_base_url("brave-key", server.uri())
    }

    #[tokio::test]
    async fn search_parses_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/res/v1/web/search"))
            .and(header("X-Subscription-Token", "brave-key"))
            .and(query_param("q", "rust async"))
            .and(query_param("count", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "web": {"results": [
                    {"title": "Tokio", "url": "https://tokio.rs", "description": "An async runtime"},
                    {"title": "Async book", "url": "https://rust-lang.github.io/async-book/", "description": "The async book"},
                ]}
            })))
            .mount(&server)
            .await;

        let results = client_for(&server).search("rust async", 3).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Tokio");
        assert_eq!(results[1].snippet, "The async book");
    }

    #[tokio::test]
    async fn search_truncates_to_max_results() {
        let server = MockServer::start().await;
        let results: Vec<_> = (0..10)
            .map(|i| json!({"title": format!("r{i}"), "url": "u", "description": "d"}))
            .collect();
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"web": {"results": results}})),
            )
            .mount(&server)
            .await;

        let results = client_for(&server).search("q", 4).await.unwrap();
        assert_eq!(results.len(), 4);
    }

    #[tokio::test]
    async fn search_handles_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let results = client_for(&server).search("obscure", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_api_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client_for(&server).search("q", 5).await.unwrap_err();
        assert!(matches!(err, SearchError::Api { status: 429, .. }));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let short = "hello";
        assert_eq!(truncate_query(short), "hello");

        let long = "é".repeat(300); // 600 bytes
        let truncated = truncate_query(&long);
        assert!(truncated.len() <= MAX_QUERY_LENGTH);
        assert!(truncated.chars().all(|c| c == 'é'));
    }
}
