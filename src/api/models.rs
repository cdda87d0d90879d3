use serde::Serialize;

use crate::data_models::SearchResult;

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub search_configured: bool,
    pub generation_configured: bool,
}
