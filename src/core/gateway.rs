//! Boundary to the remote completion provider.
//!
//! A gateway turns an ordered history into a lazy stream of **cumulative**
//! snapshots: every `Ok` item is the whole reply so far, never just the new
//! fragment. The stream ends after the provider finishes, or right after the
//! first `Err` item.

use std::error::Error as StdError;
use std::fmt;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{FutureExt, StreamExt};
use memchr::memchr;
use tracing::{debug, warn};

use crate::api::{ChatCompletion, ChatRequest, ChatResponse};
use crate::core::config::ResponseMode;
use crate::core::message::Message;

pub type DeltaStream = BoxStream<'static, Result<String, GatewayError>>;

pub trait CompletionGateway: Send + Sync {
    /// Start a completion for `history`. Nothing is sent until the returned
    /// stream is first polled.
    fn submit(&self, history: &[Message]) -> DeltaStream;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The request could not be sent or the body could not be read.
    Transport(String),

    /// The provider answered with an error, either as an HTTP status or
    /// inside the event stream.
    Api {
        status: Option<u16>,
        message: String,
    },

    /// The provider answered with a body that is not a completion.
    Decode(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Transport(message) => write!(f, "connection error: {message}"),
            GatewayError::Api {
                status: Some(status),
                message,
            } => write!(f, "{message} (HTTP {status})"),
            GatewayError::Api {
                status: None,
                message,
            } => write!(f, "{message}"),
            GatewayError::Decode(message) => write!(f, "malformed response: {message}"),
        }
    }
}

impl StdError for GatewayError {}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

pub struct OpenAiGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    mode: ResponseMode,
}

impl OpenAiGateway {
    pub fn new(base_url: &str, api_key: &str, model: &str, mode: ResponseMode) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: construct_api_url(base_url, "chat/completions"),
            api_key: api_key.to_string(),
            model: model.to_string(),
            mode,
        }
    }
}

impl CompletionGateway for OpenAiGateway {
    fn submit(&self, history: &[Message]) -> DeltaStream {
        let request = ChatRequest::new(&self.model, history, self.mode.is_streaming());
        debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            messages = history.len(),
            streaming = self.mode.is_streaming(),
            "submitting completion request"
        );

        let pending = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .boxed();

        match self.mode {
            ResponseMode::Streaming => sse_snapshots(pending).boxed(),
            ResponseMode::Batched => stream::once(batched_reply(pending)).boxed(),
        }
    }
}

/// Join a base URL and an endpoint path without doubling slashes.
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

type PendingResponse = BoxFuture<'static, reqwest::Result<reqwest::Response>>;

async fn connect(pending: PendingResponse) -> Result<reqwest::Response, GatewayError> {
    let response = pending.await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    warn!(status = status.as_u16(), "completion request rejected");
    Err(GatewayError::Api {
        status: Some(status.as_u16()),
        message: summarize_error_body(&body),
    })
}

async fn batched_reply(pending: PendingResponse) -> Result<String, GatewayError> {
    let response = connect(pending).await?;
    let body = response.text().await?;
    let completion: ChatCompletion =
        serde_json::from_str(&body).map_err(|_| GatewayError::Decode(summarize_error_body(&body)))?;

    Ok(completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default())
}

enum SseState {
    Connecting(PendingResponse),
    Reading(SseReader),
    Finished,
}

struct SseReader {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    exhausted: bool,
}

fn sse_snapshots(pending: PendingResponse) -> impl futures_util::Stream<Item = Result<String, GatewayError>> {
    stream::unfold(SseState::Connecting(pending), |mut state| async move {
        loop {
            state = match state {
                SseState::Finished => return None,
                SseState::Connecting(pending) => match connect(pending).await {
                    Ok(response) => SseState::Reading(SseReader {
                        body: response
                            .bytes_stream()
                            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                            .boxed(),
                        decoder: SseDecoder::default(),
                        exhausted: false,
                    }),
                    Err(err) => return Some((Err(err), SseState::Finished)),
                },
                SseState::Reading(mut reader) => {
                    match reader.decoder.next_frame() {
                        Some(Ok(SseFrame::Snapshot(text))) => {
                            return Some((Ok(text), SseState::Reading(reader)))
                        }
                        Some(Ok(SseFrame::Finished)) => return None,
                        Some(Err(err)) => return Some((Err(err), SseState::Finished)),
                        None if reader.exhausted => return None,
                        None => {}
                    }

                    match reader.body.next().await {
                        Some(Ok(bytes)) => reader.decoder.push_bytes(&bytes),
                        Some(Err(err)) => return Some((Err(err.into()), SseState::Finished)),
                        None => {
                            reader.decoder.end_of_input();
                            reader.exhausted = true;
                        }
                    }
                    SseState::Reading(reader)
                }
            };
        }
    })
}

#[derive(Debug, PartialEq, Eq)]
enum SseFrame {
    Snapshot(String),
    Finished,
}

/// Incremental decoder for `text/event-stream` completion bodies.
///
/// Bytes are buffered until a full line is available; each content delta is
/// folded into the running text and reported as a fresh snapshot.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    text: String,
}

impl SseDecoder {
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Terminate a trailing line that arrived without a newline.
    fn end_of_input(&mut self) {
        if !self.buffer.is_empty() {
            self.buffer.push(b'\n');
        }
    }

    fn next_frame(&mut self) -> Option<Result<SseFrame, GatewayError>> {
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line = String::from_utf8_lossy(&self.buffer[..newline_pos])
                .trim()
                .to_string();
            self.buffer.drain(..=newline_pos);

            if let Some(frame) = self.process_line(&line) {
                return Some(frame);
            }
        }
        None
    }

    fn process_line(&mut self, line: &str) -> Option<Result<SseFrame, GatewayError>> {
        let payload = line.strip_prefix("data:")?.trim_start();
        if payload == "[DONE]" {
            return Some(Ok(SseFrame::Finished));
        }
        if payload.is_empty() {
            return None;
        }

        match serde_json::from_str::<ChatResponse>(payload) {
            Ok(response) => {
                let content = response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|content| !content.is_empty())?;
                self.text.push_str(&content);
                Some(Ok(SseFrame::Snapshot(self.text.clone())))
            }
            Err(_) => Some(Err(GatewayError::Api {
                status: None,
                message: summarize_error_body(payload),
            })),
        }
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .or_else(|| value.get("error").and_then(|v| v.as_str()))
        .or_else(|| value.get("message").and_then(|v| v.as_str()))?;

    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Reduce a provider error body to one readable line.
pub fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty error response".to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&value) {
            return summary;
        }
    }

    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}
