use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::data_models::SearchResult;
use crate::error::{AppError, AppResult, SearchError, ValidationIssue};

/// Number of organic results requested from the provider and the hard cap
/// on what lookup returns.
pub const MAX_RESULTS: usize = 10;

const UNTITLED: &str = "Untitled";

/// Anything that can turn a query into ranked organic results.
pub trait SearchProvider: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
        num: usize,
    ) -> BoxFuture<'a, Result<Vec<SearchResult>, SearchError>>;
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    organic_results: Option<Vec<SerpApiOrganicItem>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpApiOrganicItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
    position: Option<u32>,
}

/// Parses a SerpAPI JSON body into normalized results.
///
/// Items without a link are dropped, a missing title becomes `"Untitled"`,
/// a missing snippet becomes empty, and a missing position falls back to
/// the 1-based array index. Order is the provider's.
pub fn parse_search_response(body: &str) -> Result<Vec<SearchResult>, SearchError> {
    let response: SerpApiResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::InvalidResponse(format!("JSON parse error: {e}")))?;

    if let Some(message) = &response.error {
        // SerpAPI reports "no results" as a 200 with an error field.
        debug!(message = %message, "SerpAPI returned no organic results");
    }

    let results = response
        .organic_results
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let link = item.link.map(|l| l.trim().to_string()).unwrap_or_default();
            if link.is_empty() {
                return None;
            }
            let position = match item.position {
                Some(p) if p >= 1 => p,
                _ => idx as u32 + 1,
            };
            Some(SearchResult::new(
                item.title.unwrap_or_else(|| UNTITLED.to_string()),
                link,
                item.snippet.unwrap_or_default(),
                position,
            ))
        })
        .take(MAX_RESULTS)
        .collect();

    Ok(results)
}

/// SerpAPI client. One instance per process, shared by reference.
#[derive(Debug, Clone)]
pub struct SerpApiClient {
    http_client: Client,
    api_key: Option<String>,
    base_url: String,
    engine: String,
}

impl SerpApiClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key,
            base_url: base_url.into(),
            engine: crate::config::DEFAULT_SERPAPI_ENGINE.to_string(),
        }
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self), fields(engine = %self.engine))]
    async fn search_inner(
        &self,
        query: &str,
        num: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let api_key = self.api_key.as_deref().ok_or(SearchError::MissingApiKey)?;
        let num = num.to_string();

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("api_key", api_key),
                ("engine", self.engine.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                // the request URL carries the api key
                let e = e.without_url();
                error!(error = %e, "network error during SerpAPI request");
                SearchError::Network(e)
            })?;

        let status = response.status();
        debug!(status = %status, "received response from SerpAPI");

        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or_default().to_string();
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "SerpAPI error");
            return Err(SearchError::Status {
                status: status.as_u16(),
                message: if reason.is_empty() { body } else { reason },
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Network(e.without_url()))?;
        let results = parse_search_response(&body)?;
        debug!(result_count = results.len(), "search completed");
        Ok(results)
    }
}

impl SearchProvider for SerpApiClient {
    fn search<'a>(
        &'a self,
        query: &'a str,
        num: usize,
    ) -> BoxFuture<'a, Result<Vec<SearchResult>, SearchError>> {
        Box::pin(self.search_inner(query, num))
    }
}

/// Validates a query and fetches its sources. Single attempt, single page.
#[derive(Clone)]
pub struct SourceLookup {
    provider: Arc<dyn SearchProvider>,
}

impl SourceLookup {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }

    /// Returns up to [`MAX_RESULTS`] results in provider order. Zero results
    /// is an empty vector, not an error; callers decide whether that's fatal.
    pub async fn lookup(&self, query: &str) -> AppResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(AppError::invalid(
                "Query is required",
                vec![ValidationIssue::new("query", "must be a non-empty string")],
            ));
        }

        let mut results = self.provider.search(query, MAX_RESULTS).await?;
        results.truncate(MAX_RESULTS);
        Ok(results)
    }
}
