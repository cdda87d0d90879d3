use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Errors raised while talking to the search provider.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("SERPAPI_KEY is not configured")]
    MissingApiKey,

    /// Built from an error stripped of its URL, which holds the api key.
    #[error("network error: {0}")]
    Network(reqwest::Error),

    #[error("SerpAPI error: {status} {message}")]
    Status { status: u16, message: String },

    #[error("invalid response from SerpAPI: {0}")]
    InvalidResponse(String),
}

/// Errors raised while talking to the generation provider.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("ANTHROPIC_API_KEY is not configured")]
    MissingApiKey,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Anthropic API error: {status} {message}")]
    Status { status: u16, message: String },

    #[error("invalid stream data from Anthropic: {0}")]
    InvalidResponse(String),

    #[error("Anthropic stream error ({kind}): {message}")]
    Provider { kind: String, message: String },

    #[error("invalid generation input: {0}")]
    InvalidInput(String),
}

/// A single schema violation found while validating a request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Failure kinds surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{summary}")]
    InvalidRequest {
        summary: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("No search results found")]
    NotFound,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// A server-side failure labelled with what the endpoint was doing.
    #[error("{summary}: {source}")]
    Labelled {
        summary: &'static str,
        source: Box<AppError>,
    },
}

impl AppError {
    pub fn invalid(summary: impl Into<String>, issues: Vec<ValidationIssue>) -> Self {
        AppError::InvalidRequest {
            summary: summary.into(),
            issues,
        }
    }

    /// Replaces the generic summary of a 500 with `summary`. Client errors
    /// keep their own message.
    pub fn labelled(self, summary: &'static str) -> Self {
        match self {
            AppError::Configuration(_) | AppError::Upstream(_) | AppError::Internal(_) => {
                AppError::Labelled {
                    summary,
                    source: Box::new(self),
                }
            }
            AppError::Labelled { source, .. } => AppError::Labelled { summary, source },
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Labelled { source, .. } => source.status_code(),
            AppError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Configuration(_) | AppError::Upstream(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Labelled { source, .. } => source.error_code(),
            AppError::InvalidRequest { .. } => "INVALID_REQUEST",
            AppError::NotFound => "NOT_FOUND",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn summary(&self) -> String {
        match self {
            AppError::InvalidRequest { summary, .. } => summary.clone(),
            AppError::NotFound => self.to_string(),
            AppError::Configuration(_) => "Service is not configured".to_string(),
            AppError::Upstream(_) => "Upstream provider request failed".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Labelled { summary, .. } => summary.to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::InvalidRequest { issues, .. } if issues.is_empty() => None,
            AppError::InvalidRequest { issues, .. } => Some(json!(issues)),
            AppError::NotFound => None,
            AppError::Configuration(msg) | AppError::Upstream(msg) | AppError::Internal(msg) => {
                Some(Value::String(msg.clone()))
            }
            AppError::Labelled { source, .. } => source.details(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "request failed: {self}");
        }
        let body = ErrorBody {
            error: self.summary(),
            code: self.error_code(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        AppError::invalid(
            "Request body must be a JSON object",
            vec![ValidationIssue::new("", err.body_text())],
        )
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::MissingApiKey => AppError::Configuration(err.to_string()),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::MissingApiKey => AppError::Configuration(err.to_string()),
            GenerationError::InvalidInput(msg) => AppError::Internal(msg),
            other => AppError::Upstream(other.to_string()),
        }
    }
}
