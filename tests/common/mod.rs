#![allow(dead_code)]

use futures::StreamExt;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use answer_engine::answer::AnswerPipeline;
use answer_engine::api::{AppState, Credentials};
use answer_engine::data_models::SearchResult;
use answer_engine::error::{GenerationError, SearchError};
use answer_engine::llm::{GenerationProvider, GenerationRequest, TextStream};
use answer_engine::relay::RelayConfig;
use answer_engine::search::{SearchProvider, SourceLookup};

/// Search provider returning a canned response and counting calls.
pub struct StubSearch {
    results: Vec<SearchResult>,
    fail_with_status: Option<u16>,
    missing_key: bool,
    pub calls: AtomicUsize,
    pub queries: Mutex<Vec<String>>,
}

impl StubSearch {
    pub fn returning(results: Vec<SearchResult>) -> Arc<Self> {
        Arc::new(Self {
            results,
            fail_with_status: None,
            missing_key: false,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            results: Vec::new(),
            fail_with_status: Some(status),
            missing_key: false,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn unconfigured() -> Arc<Self> {
        Arc::new(Self {
            results: Vec::new(),
            fail_with_status: None,
            missing_key: true,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SearchProvider for StubSearch {
    fn search<'a>(
        &'a self,
        query: &'a str,
        _num: usize,
    ) -> BoxFuture<'a, Result<Vec<SearchResult>, SearchError>> {
        Box::pin(async move {
            if self.missing_key {
                return Err(SearchError::MissingApiKey);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_string());
            if let Some(status) = self.fail_with_status {
                return Err(SearchError::Status {
                    status,
                    message: "Bad Gateway".to_string(),
                });
            }
            Ok(self.results.clone())
        })
    }
}

/// Generation provider that streams its own input back: the system prompt
/// first (if any), then every message's content, one chunk each.
pub struct EchoGenerator {
    pub requests: Mutex<Vec<GenerationRequest>>,
    fail_mid_stream: bool,
    reject_with_status: Option<u16>,
}

impl EchoGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail_mid_stream: false,
            reject_with_status: None,
        })
    }

    pub fn failing_mid_stream() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail_mid_stream: true,
            reject_with_status: None,
        })
    }

    pub fn rejecting(status: u16) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail_mid_stream: false,
            reject_with_status: Some(status),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> GenerationRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("generator was never called")
    }
}

impl GenerationProvider for EchoGenerator {
    fn model_id(&self) -> &str {
        "echo"
    }

    fn stream(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<TextStream, GenerationError>> {
        Box::pin(async move {
            if let Some(status) = self.reject_with_status {
                return Err(GenerationError::Status {
                    status,
                    message: "overloaded".to_string(),
                });
            }
            self.requests.lock().unwrap().push(request.clone());

            let mut chunks: Vec<Result<String, GenerationError>> = Vec::new();
            if let Some(system) = request.system {
                chunks.push(Ok(system));
            }
            for message in request.messages {
                chunks.push(Ok(message.content));
            }
            if self.fail_mid_stream {
                chunks.push(Err(GenerationError::Provider {
                    kind: "overloaded_error".to_string(),
                    message: "Overloaded".to_string(),
                }));
            }
            Ok(futures::stream::iter(chunks).boxed())
        })
    }
}

pub fn paris_result() -> SearchResult {
    SearchResult::new(
        "Paris - Wikipedia".to_string(),
        "https://en.wikipedia.org/wiki/Paris".to_string(),
        "Paris is the capital of France.".to_string(),
        1,
    )
}

pub fn numbered_results(count: usize) -> Vec<SearchResult> {
    (1..=count)
        .map(|i| {
            SearchResult::new(
                format!("Result {i}"),
                format!("https://example.com/{i}"),
                format!("Snippet number {i}."),
                i as u32,
            )
        })
        .collect()
}

pub fn pipeline(search: Arc<StubSearch>, generator: Arc<EchoGenerator>) -> AnswerPipeline {
    AnswerPipeline::new(SourceLookup::new(search), generator)
}

pub fn app_state(search: Arc<StubSearch>, generator: Arc<EchoGenerator>) -> AppState {
    let sources = SourceLookup::new(search);
    AppState {
        pipeline: AnswerPipeline::new(sources.clone(), generator),
        sources,
        relay: RelayConfig::default(),
        credentials: Credentials {
            search: true,
            generation: true,
        },
    }
}
