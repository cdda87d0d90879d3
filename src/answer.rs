use std::fmt;
use std::sync::Arc;

use crate::data_models::SearchResult;
use crate::error::{AppError, AppResult};
use crate::llm::{GenerationProvider, GenerationRequest, TextStream};
use crate::prompt::PromptContext;
use crate::request::{AnswerRequest, InputShape, NormalizedInput};
use crate::search::SourceLookup;

/// Per-request lifecycle. Nothing here is persisted; every request starts
/// over at `Validating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Validating,
    LookingUpSources,
    NotFound,
    BuildingPrompt,
    Streaming,
    Completed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Validating => "validating",
            PipelineState::LookingUpSources => "looking_up_sources",
            PipelineState::NotFound => "not_found",
            PipelineState::BuildingPrompt => "building_prompt",
            PipelineState::Streaming => "streaming",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl PipelineState {
    pub fn enter(self) {
        tracing::debug!(state = %self, "answer pipeline");
    }
}

/// A started answer: the sources the prompt was built from plus the live
/// text stream citing them.
pub struct Answer {
    pub query: String,
    pub sources: Vec<SearchResult>,
    pub stream: TextStream,
}

/// Search, prompt, generate. Sequential within a request; the search must
/// finish before generation can cite it.
#[derive(Clone)]
pub struct AnswerPipeline {
    sources: SourceLookup,
    generator: Arc<dyn GenerationProvider>,
}

impl AnswerPipeline {
    pub fn new(sources: SourceLookup, generator: Arc<dyn GenerationProvider>) -> Self {
        Self { sources, generator }
    }

    pub fn model_id(&self) -> &str {
        self.generator.model_id()
    }

    /// Builds the provider request for one turn. Prompts get a single
    /// combined prompt; conversations get a system prompt plus the history.
    pub fn build_request(input: &NormalizedInput, results: &[SearchResult]) -> GenerationRequest {
        let context = PromptContext::new(results);
        match input.shape {
            InputShape::Prompt => GenerationRequest::from_prompt(context.completion_prompt(&input.query)),
            InputShape::Conversation => {
                GenerationRequest::from_conversation(context.chat_system_prompt(), input.history.clone())
            }
        }
    }

    /// Runs the pipeline up to the first byte of the stream. Any failure
    /// before then comes back as an [`AppError`]; failures afterwards travel
    /// inside the stream.
    pub async fn answer(&self, request: AnswerRequest) -> AppResult<Answer> {
        PipelineState::Validating.enter();
        let input = request.normalize()?;

        PipelineState::LookingUpSources.enter();
        let sources = self.sources.lookup(&input.query).await.inspect_err(|_| {
            PipelineState::Failed.enter();
        })?;
        if sources.is_empty() {
            PipelineState::NotFound.enter();
            return Err(AppError::NotFound);
        }

        PipelineState::BuildingPrompt.enter();
        let generation = Self::build_request(&input, &sources);
        tracing::debug!(
            sources = sources.len(),
            history = input.history.len(),
            query_len = input.query.len(),
            "prompt assembled"
        );

        let stream = self.generator.stream(generation).await.map_err(|e| {
            PipelineState::Failed.enter();
            AppError::from(e)
        })?;
        PipelineState::Streaming.enter();

        Ok(Answer {
            query: input.query,
            sources,
            stream,
        })
    }
}
