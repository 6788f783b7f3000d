//! Per-session chat state and its transitions.
//!
//! [`ChatSession`] is owned and mutated by the UI loop alone. It performs no
//! I/O: key presses and relay polls go in, and the returned
//! [`SessionCommand`] / [`PollOutcome`] tell the loop what to do next.

use tracing::{debug, warn};

use crate::core::message::Message;
use crate::core::relay::{RelayEvent, RelayPoll};
use crate::core::transcript::Transcript;

pub const EMPTY_RESPONSE_ERROR: &str = "empty response from model";

/// Key presses after binding resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Quit,
    Submit,
    Backspace,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Request sent, no reply text yet.
    AwaitingFirstByte,
    /// Reply text is arriving.
    Streaming,
    /// Startup failed; only quitting is possible.
    Fatal,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SessionCommand {
    None,
    Quit,
    /// Start a request for this history (ends with the new user message).
    StartRequest(Vec<Message>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The turn is still open; poll again.
    Continue,
    /// A terminal event was applied; drop the stream handle.
    Settled,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    model: String,
    transcript: Transcript,
    input: String,
    loading: bool,
    streaming: bool,
    partial: String,
    error: Option<String>,
    fatal: Option<String>,
}

impl ChatSession {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            transcript: Transcript::new(),
            input: String::new(),
            loading: false,
            streaming: false,
            partial: String::new(),
            error: None,
            fatal: None,
        }
    }

    /// A session that failed to start. It renders `message` and waits for quit.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            fatal: Some(message.into()),
            ..Self::new(String::new())
        }
    }

    pub fn phase(&self) -> Phase {
        if self.fatal.is_some() {
            Phase::Fatal
        } else if self.streaming {
            Phase::Streaming
        } else if self.loading {
            Phase::AwaitingFirstByte
        } else {
            Phase::Idle
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn partial(&self) -> &str {
        &self.partial
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    pub fn handle_key(&mut self, key: KeyInput) -> SessionCommand {
        match key {
            KeyInput::Quit => SessionCommand::Quit,
            _ if self.fatal.is_some() || self.loading => SessionCommand::None,
            KeyInput::Submit => self.submit(),
            KeyInput::Backspace => {
                self.input.pop();
                SessionCommand::None
            }
            KeyInput::Char(c) => {
                self.input.push(c);
                SessionCommand::None
            }
        }
    }

    fn submit(&mut self) -> SessionCommand {
        if self.input.is_empty() {
            return SessionCommand::None;
        }

        let content = std::mem::take(&mut self.input);
        self.transcript.push(Message::user(content));
        self.loading = true;
        self.streaming = false;
        self.partial.clear();
        self.error = None;
        debug!(messages = self.transcript.len(), "turn started");

        SessionCommand::StartRequest(self.transcript.snapshot())
    }

    pub fn apply_poll(&mut self, poll: RelayPoll) -> PollOutcome {
        if !self.loading {
            warn!(?poll, "relay poll with no request in flight");
            return PollOutcome::Settled;
        }

        match poll {
            RelayPoll::Waiting => PollOutcome::Continue,
            RelayPoll::Event(RelayEvent::Update(text)) => {
                if !text.is_empty() {
                    // Snapshots are cumulative: replace, never append.
                    self.partial = text;
                    self.streaming = true;
                }
                PollOutcome::Continue
            }
            RelayPoll::Event(RelayEvent::Done(text)) => {
                if text.is_empty() {
                    debug!("turn finished without content");
                    self.error = Some(EMPTY_RESPONSE_ERROR.to_string());
                } else {
                    debug!(chars = text.chars().count(), "turn finished");
                    self.transcript.push(Message::assistant(text));
                }
                self.end_turn();
                PollOutcome::Settled
            }
            RelayPoll::Event(RelayEvent::Failed(description)) => {
                debug!(error = %description, "turn failed");
                self.error = Some(description);
                self.end_turn();
                PollOutcome::Settled
            }
        }
    }

    fn end_turn(&mut self) {
        self.loading = false;
        self.streaming = false;
        self.partial.clear();
    }
}
