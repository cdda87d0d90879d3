//! Provider-to-client stream relay.
//!
//! A spawned producer task drains the provider stream into a bounded channel;
//! the HTTP body consumes the receiving end. The producer waits whenever the
//! channel is full, so provider output is never buffered without limit. The
//! channel closes when the producer finishes, fails, or sees the consumer go
//! away.

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::answer::PipelineState;
use crate::config::{Config, DEFAULT_STREAM_BUFFER};
use crate::llm::TextStream;

pub const UI_MESSAGE_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";
pub const UI_MESSAGE_STREAM_VERSION: &str = "v1";
/// Tells nginx-style proxies not to hold back streamed frames.
pub const ACCEL_BUFFERING_HEADER: &str = "x-accel-buffering";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub buffer: usize,
    pub smoothing: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_STREAM_BUFFER,
            smoothing: None,
        }
    }
}

impl From<&Config> for RelayConfig {
    fn from(config: &Config) -> Self {
        Self {
            buffer: config.stream_buffer.max(1),
            smoothing: config.stream_smoothing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Delta(String),
    Error(String),
}

/// Splits incoming text into whole words with their trailing whitespace.
/// A trailing partial word is held back until more text or `flush`.
#[derive(Debug, Default)]
pub struct WordChunker {
    buffer: String,
}

impl WordChunker {
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);
        let mut chunks = Vec::new();
        loop {
            let Some(word_end) = self.buffer.find(|c: char| !c.is_whitespace()).and_then(|start| {
                self.buffer[start..]
                    .find(char::is_whitespace)
                    .map(|offset| start + offset)
            }) else {
                break;
            };
            let chunk_end = self.buffer[word_end..]
                .find(|c: char| !c.is_whitespace())
                .map(|offset| word_end + offset);
            match chunk_end {
                Some(end) => {
                    let rest = self.buffer.split_off(end);
                    chunks.push(std::mem::replace(&mut self.buffer, rest));
                }
                // whitespace runs to the end; more may follow in the next delta
                None => break,
            }
        }
        chunks
    }

    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

/// Starts relaying `source` and returns the consumer end.
pub fn spawn_relay(source: TextStream, config: RelayConfig) -> ReceiverStream<RelayEvent> {
    let (tx, rx) = mpsc::channel(config.buffer.max(1));
    tokio::spawn(produce(source, tx, config.smoothing));
    ReceiverStream::new(rx)
}

async fn produce(mut source: TextStream, tx: mpsc::Sender<RelayEvent>, smoothing: Option<Duration>) {
    let mut chunker = WordChunker::default();
    let mut forwarded = 0usize;

    while let Some(item) = source.next().await {
        match item {
            Ok(text) => {
                let pieces = match smoothing {
                    Some(_) => chunker.push(&text),
                    None => vec![text],
                };
                for piece in pieces {
                    if tx.send(RelayEvent::Delta(piece)).await.is_err() {
                        tracing::debug!(forwarded, "client went away, stopping relay");
                        return;
                    }
                    forwarded += 1;
                    if let Some(delay) = smoothing {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, forwarded, "generation stream failed");
                PipelineState::Failed.enter();
                if let Some(rest) = chunker.flush() {
                    let _ = tx.send(RelayEvent::Delta(rest)).await;
                }
                let _ = tx.send(RelayEvent::Error(e.to_string())).await;
                return;
            }
        }
    }

    if let Some(rest) = chunker.flush() {
        let _ = tx.send(RelayEvent::Delta(rest)).await;
    }
    tracing::debug!(forwarded, "generation stream completed");
    PipelineState::Completed.enter();
}

/// Raw token stream: deltas are written as-is. A failure simply ends the body.
pub fn text_body(events: ReceiverStream<RelayEvent>) -> BoxStream<'static, Result<String, Infallible>> {
    events
        .take_while(|event| futures::future::ready(matches!(event, RelayEvent::Delta(_))))
        .filter_map(|event| async move {
            match event {
                RelayEvent::Delta(text) => Some(Ok(text)),
                RelayEvent::Error(_) => None,
            }
        })
        .boxed()
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum UiChunk<'a> {
    Start {
        #[serde(rename = "messageId")]
        message_id: &'a str,
    },
    StartStep,
    TextStart {
        id: &'a str,
    },
    TextDelta {
        id: &'a str,
        delta: &'a str,
    },
    TextEnd {
        id: &'a str,
    },
    FinishStep,
    Finish,
    Error {
        #[serde(rename = "errorText")]
        error_text: &'a str,
    },
}

fn sse_frame(chunk: &UiChunk<'_>) -> String {
    // UiChunk only holds strings, serialization can't fail
    let json = serde_json::to_string(chunk).unwrap_or_default();
    format!("data: {json}\n\n")
}

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Chat-stream envelope: server-sent events understood by UI message stream
/// clients, always closed with `[DONE]`.
pub fn ui_message_body(
    mut events: ReceiverStream<RelayEvent>,
) -> BoxStream<'static, Result<String, Infallible>> {
    let message_id = format!("msg-{}", nanoid::nanoid!());
    let text_id = "txt-0";

    let stream = async_stream::stream! {
        yield Ok::<String, Infallible>(sse_frame(&UiChunk::Start { message_id: &message_id }));
        yield Ok(sse_frame(&UiChunk::StartStep));
        yield Ok(sse_frame(&UiChunk::TextStart { id: text_id }));

        let mut failure = None;
        while let Some(event) = events.next().await {
            match event {
                RelayEvent::Delta(delta) => {
                    yield Ok(sse_frame(&UiChunk::TextDelta { id: text_id, delta: &delta }));
                }
                RelayEvent::Error(message) => {
                    failure = Some(message);
                    break;
                }
            }
        }

        yield Ok(sse_frame(&UiChunk::TextEnd { id: text_id }));
        match failure {
            Some(message) => {
                yield Ok(sse_frame(&UiChunk::Error { error_text: &message }));
            }
            None => {
                yield Ok(sse_frame(&UiChunk::FinishStep));
                yield Ok(sse_frame(&UiChunk::Finish));
            }
        }
        yield Ok(DONE_FRAME.to_string());
    };
    stream.boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;

    fn source(items: Vec<Result<&'static str, GenerationError>>) -> TextStream {
        futures::stream::iter(items.into_iter().map(|r| r.map(str::to_string))).boxed()
    }

    #[test]
    fn test_word_chunker_holds_partial_words() {
        let mut chunker = WordChunker::default();
        assert_eq!(chunker.push("Hel"), Vec::<String>::new());
        assert_eq!(chunker.push("lo wor"), vec!["Hello ".to_string()]);
        assert_eq!(chunker.push("ld  and\n"), vec!["world  ".to_string()]);
        assert_eq!(chunker.push("more"), vec!["and\n".to_string()]);
        assert_eq!(chunker.flush(), Some("more".to_string()));
        assert_eq!(chunker.flush(), None);
    }

    #[test]
    fn test_word_chunker_leading_whitespace_stays_with_first_word() {
        let mut chunker = WordChunker::default();
        assert_eq!(chunker.push("  Paris is"), vec!["  Paris ".to_string()]);
        assert_eq!(chunker.flush(), Some("is".to_string()));
    }

    #[tokio::test]
    async fn test_relay_forwards_in_order_and_closes() {
        let rx = spawn_relay(source(vec![Ok("a"), Ok("b"), Ok("c")]), RelayConfig::default());
        let events: Vec<RelayEvent> = rx.collect().await;
        assert_eq!(
            events,
            vec![
                RelayEvent::Delta("a".into()),
                RelayEvent::Delta("b".into()),
                RelayEvent::Delta("c".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_relay_surfaces_error_then_closes() {
        let rx = spawn_relay(
            source(vec![
                Ok("partial"),
                Err(GenerationError::Provider {
                    kind: "overloaded_error".into(),
                    message: "Overloaded".into(),
                }),
                Ok("never"),
            ]),
            RelayConfig::default(),
        );
        let events: Vec<RelayEvent> = rx.collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], RelayEvent::Error(m) if m.contains("Overloaded")));
    }

    #[tokio::test]
    async fn test_relay_smoothing_rechunks_words() {
        let config = RelayConfig {
            buffer: 1,
            smoothing: Some(Duration::from_millis(1)),
        };
        let rx = spawn_relay(source(vec![Ok("The capi"), Ok("tal is Paris.")]), config);
        let events: Vec<RelayEvent> = rx.collect().await;
        let texts: Vec<String> = events
            .into_iter()
            .map(|e| match e {
                RelayEvent::Delta(t) => t,
                RelayEvent::Error(e) => panic!("unexpected error {e}"),
            })
            .collect();
        assert_eq!(texts, vec!["The ", "capital ", "is ", "Paris."]);
    }

    #[tokio::test]
    async fn test_bounded_channel_applies_backpressure() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let pulled = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = pulled.clone();
        let infinite = futures::stream::repeat_with(move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok::<_, GenerationError>("x".to_string())
        })
        .boxed();

        let events = spawn_relay(
            infinite,
            RelayConfig {
                buffer: 4,
                smoothing: None,
            },
        );
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(());
        });
        rx.await.unwrap();

        // buffer + the item held by the blocked send
        assert!(pulled.load(std::sync::atomic::Ordering::SeqCst) <= 4 + 1);
        drop(events);
    }

    #[tokio::test]
    async fn test_text_body_stops_at_error() {
        let rx = spawn_relay(
            source(vec![Ok("one "), Err(GenerationError::InvalidResponse("bad".into()))]),
            RelayConfig::default(),
        );
        let body: Vec<String> = text_body(rx).map(|r| r.unwrap()).collect().await;
        assert_eq!(body, vec!["one "]);
    }

    #[tokio::test]
    async fn test_ui_message_body_framing() {
        let rx = spawn_relay(source(vec![Ok("Paris"), Ok(" [1]")]), RelayConfig::default());
        let frames: Vec<String> = ui_message_body(rx).map(|r| r.unwrap()).collect().await;
        assert!(frames[0].starts_with(r#"data: {"type":"start","messageId":"msg-"#));
        assert_eq!(frames[1], "data: {\"type\":\"start-step\"}\n\n");
        assert_eq!(frames[2], "data: {\"type\":\"text-start\",\"id\":\"txt-0\"}\n\n");
        assert_eq!(
            frames[3],
            "data: {\"type\":\"text-delta\",\"id\":\"txt-0\",\"delta\":\"Paris\"}\n\n"
        );
        assert_eq!(frames[5], "data: {\"type\":\"text-end\",\"id\":\"txt-0\"}\n\n");
        assert_eq!(frames[6], "data: {\"type\":\"finish-step\"}\n\n");
        assert_eq!(frames[7], "data: {\"type\":\"finish\"}\n\n");
        assert_eq!(frames[8], "data: [DONE]\n\n");
        assert_eq!(frames.len(), 9);
    }

    #[tokio::test]
    async fn test_ui_message_body_reports_error_chunk() {
        let rx = spawn_relay(
            source(vec![Err(GenerationError::InvalidResponse("bad".into()))]),
            RelayConfig::default(),
        );
        let frames: Vec<String> = ui_message_body(rx).map(|r| r.unwrap()).collect().await;
        assert!(frames.iter().any(|f| f.contains(r#""type":"error""#)));
        assert!(!frames.iter().any(|f| f.contains(r#""type":"finish""#)));
        assert!(!frames.iter().any(|f| f.contains(r#""type":"finish-step""#)));
        assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
    }
}
