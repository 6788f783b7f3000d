//! The interactive event loop.
//!
//! [`ChatLoop`] pairs the session state with the relay and the stream handle
//! of the request in flight. [`run_chat`] drives it: it waits on terminal
//! input and on the bounded-timeout relay poll, applies whichever arrives
//! first, and redraws. All session mutation happens on this one task.

use std::{error::Error, io, time::Duration};

use ratatui::crossterm::event::{self, Event, KeyEventKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::relay::{RelayEvent, RelayPoll, StreamHandle, StreamRelay};
use crate::core::session::{ChatSession, KeyInput, PollOutcome, SessionCommand};
use crate::ui::keybindings::resolve_key;
use crate::ui::lifecycle::{restore_terminal, setup_terminal, ChatTerminal};
use crate::ui::renderer::ui;
use crate::ui::theme::Theme;

#[derive(Debug)]
pub enum UiEvent {
    Crossterm(Event),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit,
}

pub struct ChatLoop {
    session: ChatSession,
    relay: Option<StreamRelay>,
    stream: Option<StreamHandle>,
}

impl ChatLoop {
    pub fn new(session: ChatSession, relay: StreamRelay) -> Self {
        Self {
            session,
            relay: Some(relay),
            stream: None,
        }
    }

    /// A loop for a session that could not start; it can only be quit.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            session: ChatSession::fatal(message),
            relay: None,
            stream: None,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn has_active_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn handle_key(&mut self, key: KeyInput) -> LoopControl {
        match self.session.handle_key(key) {
            SessionCommand::None => LoopControl::Continue,
            SessionCommand::Quit => {
                if self.stream.is_some() {
                    debug!("quit with a request in flight; abandoning it");
                }
                LoopControl::Exit
            }
            SessionCommand::StartRequest(history) => {
                match &self.relay {
                    Some(relay) => self.stream = Some(relay.start(history)),
                    None => {
                        warn!("request started without a completion gateway");
                        self.session.apply_poll(RelayPoll::Event(RelayEvent::Failed(
                            "no completion gateway configured".to_string(),
                        )));
                    }
                }
                LoopControl::Continue
            }
        }
    }

    /// Wait for the next relay poll result. Pending forever when idle, so it
    /// can sit in a `select!` next to the input channel.
    pub async fn next_poll(&mut self) -> RelayPoll {
        match self.stream.as_mut() {
            Some(stream) => stream.poll().await,
            None => std::future::pending().await,
        }
    }

    pub fn apply_poll(&mut self, poll: RelayPoll) {
        if self.session.apply_poll(poll) == PollOutcome::Settled {
            self.stream = None;
        }
    }
}

enum Wake {
    Input(Option<UiEvent>),
    Stream(RelayPoll),
}

const MAX_CONSECUTIVE_READ_FAILURES: u32 = 5;

fn next_terminal_event() -> io::Result<Option<Event>> {
    if event::poll(Duration::from_millis(10))? {
        event::read().map(Some)
    } else {
        Ok(None)
    }
}

/// Forward terminal events until the receiver goes away or reading keeps
/// failing. `next_event` returns `Ok(None)` when nothing arrived in time.
async fn forward_events<F>(mut next_event: F, event_tx: mpsc::UnboundedSender<UiEvent>)
where
    F: FnMut() -> io::Result<Option<Event>>,
{
    let mut failures = 0;
    loop {
        match next_event() {
            Ok(Some(ev)) => {
                failures = 0;
                if event_tx.send(UiEvent::Crossterm(ev)).is_err() {
                    break;
                }
            }
            Ok(None) => {
                failures = 0;
                tokio::task::yield_now().await;
            }
            Err(err) => {
                failures += 1;
                warn!(error = %err, failures, "failed to read terminal event");
                if failures >= MAX_CONSECUTIVE_READ_FAILURES {
                    break;
                }
                tokio::task::yield_now().await;
            }
        }
    }
}

fn spawn_event_reader(event_tx: mpsc::UnboundedSender<UiEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(forward_events(next_terminal_event, event_tx))
}

async fn event_loop(
    terminal: &mut ChatTerminal,
    chat: &mut ChatLoop,
    theme: &Theme,
    event_rx: &mut mpsc::UnboundedReceiver<UiEvent>,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| ui(f, chat.session(), theme))?;

        let streaming = chat.has_active_stream();
        let wake = tokio::select! {
            event = event_rx.recv() => Wake::Input(event),
            poll = chat.next_poll(), if streaming => Wake::Stream(poll),
        };

        match wake {
            Wake::Input(Some(UiEvent::Crossterm(Event::Key(key))))
                if key.kind == KeyEventKind::Press =>
            {
                if let Some(input) = resolve_key(&key) {
                    if chat.handle_key(input) == LoopControl::Exit {
                        return Ok(());
                    }
                }
            }
            // Resizes and other events only need a redraw.
            Wake::Input(Some(UiEvent::Crossterm(_))) => {}
            Wake::Input(None) => return Err("terminal event reader stopped".into()),
            Wake::Stream(poll) => chat.apply_poll(poll),
        }
    }
}

/// Take over the terminal and run the chat until the user quits.
pub async fn run_chat(mut chat: ChatLoop, theme: &Theme) -> Result<(), Box<dyn Error>> {
    let mut terminal = setup_terminal()?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let event_reader_handle = spawn_event_reader(event_tx);

    let result = event_loop(&mut terminal, &mut chat, theme, &mut event_rx).await;

    event_reader_handle.abort();
    restore_terminal(&mut terminal)?;
    info!(messages = chat.session().messages().len(), "chat session ended");

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gateway::GatewayError;
    use crate::core::message::Message;
    use crate::core::session::Phase;
    use crate::test_utils::{ChannelGateway, ScriptedGateway};
    use std::sync::Arc;

    fn chat_with(gateway: impl crate::core::gateway::CompletionGateway + 'static) -> ChatLoop {
        let relay = StreamRelay::new(Arc::new(gateway)).with_poll_timeout(Duration::from_millis(20));
        ChatLoop::new(ChatSession::new("test-model"), relay)
    }

    fn type_and_submit(chat: &mut ChatLoop, text: &str) {
        for c in text.chars() {
            assert_eq!(chat.handle_key(KeyInput::Char(c)), LoopControl::Continue);
        }
        assert_eq!(chat.handle_key(KeyInput::Submit), LoopControl::Continue);
    }

    async fn pump_until_settled(chat: &mut ChatLoop) {
        let mut polls = 0;
        while chat.has_active_stream() {
            let poll = chat.next_poll().await;
            chat.apply_poll(poll);
            polls += 1;
            assert!(polls < 1_000, "stream never settled");
        }
    }

    #[tokio::test]
    async fn streamed_reply_lands_in_transcript() {
        let mut chat = chat_with(ScriptedGateway::new(vec![
            Ok("H".into()),
            Ok("He".into()),
            Ok("Hel".into()),
            Ok("Hello".into()),
        ]));

        type_and_submit(&mut chat, "hi");
        assert!(chat.has_active_stream());
        pump_until_settled(&mut chat).await;

        let session = chat.session();
        assert_eq!(
            session.messages(),
            &[Message::user("hi"), Message::assistant("Hello")]
        );
        assert_eq!(session.partial(), "");
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn gateway_error_leaves_only_user_message() {
        let mut chat = chat_with(ScriptedGateway::new(vec![Err(GatewayError::Api {
            status: None,
            message: "rate limited".into(),
        })]));

        type_and_submit(&mut chat, "hi");
        pump_until_settled(&mut chat).await;

        let session = chat.session();
        assert_eq!(session.messages(), &[Message::user("hi")]);
        assert_eq!(session.error(), Some("rate limited"));
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn follow_up_turn_sends_full_history() {
        let gateway = ScriptedGateway::new(vec![Ok("Hello".into())]);
        let mut chat = chat_with(gateway.clone());

        type_and_submit(&mut chat, "hi");
        pump_until_settled(&mut chat).await;
        type_and_submit(&mut chat, "again");
        pump_until_settled(&mut chat).await;

        let submissions = gateway.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(
            submissions[1],
            vec![
                Message::user("hi"),
                Message::assistant("Hello"),
                Message::user("again"),
            ]
        );
    }

    #[tokio::test]
    async fn typing_is_blocked_until_the_turn_resolves() {
        let (gateway, feed) = ChannelGateway::new();
        let mut chat = chat_with(gateway);

        type_and_submit(&mut chat, "hi");
        chat.handle_key(KeyInput::Char('x'));
        assert_eq!(chat.session().input(), "");

        feed.send(Ok("He".into())).expect("feed");
        while chat.session().phase() != Phase::Streaming {
            let poll = chat.next_poll().await;
            chat.apply_poll(poll);
        }
        chat.handle_key(KeyInput::Char('x'));
        assert_eq!(chat.session().input(), "");

        drop(feed);
        pump_until_settled(&mut chat).await;
        assert_eq!(chat.session().messages().last(), Some(&Message::assistant("He")));

        chat.handle_key(KeyInput::Char('x'));
        assert_eq!(chat.session().input(), "x");
    }

    #[tokio::test]
    async fn quit_mid_stream_exits_without_waiting() {
        let (gateway, _feed) = ChannelGateway::new();
        let mut chat = chat_with(gateway);

        type_and_submit(&mut chat, "hi");
        assert_eq!(chat.session().phase(), Phase::AwaitingFirstByte);
        assert_eq!(chat.handle_key(KeyInput::Quit), LoopControl::Exit);
    }

    #[tokio::test]
    async fn silent_producer_yields_waiting_polls() {
        let (gateway, _feed) = ChannelGateway::new();
        let mut chat = chat_with(gateway);

        type_and_submit(&mut chat, "hi");
        assert_eq!(chat.next_poll().await, RelayPoll::Waiting);
        chat.apply_poll(RelayPoll::Waiting);
        assert!(chat.has_active_stream());
        assert_eq!(chat.session().phase(), Phase::AwaitingFirstByte);
    }

    #[tokio::test]
    async fn event_reader_gives_up_after_repeated_failures() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut calls = 0;
        forward_events(
            || {
                calls += 1;
                Err(io::Error::other("terminal gone"))
            },
            event_tx,
        )
        .await;

        assert_eq!(calls, MAX_CONSECUTIVE_READ_FAILURES);
        assert!(event_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn event_reader_survives_isolated_failures() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut script: std::collections::VecDeque<io::Result<Option<Event>>> = [
            Err(io::Error::other("glitch")),
            Ok(None),
            Err(io::Error::other("glitch")),
            Ok(Some(Event::FocusGained)),
        ]
        .into_iter()
        .collect();
        forward_events(
            move || {
                script
                    .pop_front()
                    .unwrap_or_else(|| Err(io::Error::other("terminal gone")))
            },
            event_tx,
        )
        .await;

        assert!(matches!(
            event_rx.recv().await,
            Some(UiEvent::Crossterm(Event::FocusGained))
        ));
        assert!(event_rx.recv().await.is_none());
    }

    #[test]
    fn fatal_loop_only_quits() {
        let mut chat = ChatLoop::fatal("OPENAI_API_KEY not found in environment or .env file");
        for key in [KeyInput::Char('a'), KeyInput::Submit, KeyInput::Backspace] {
            assert_eq!(chat.handle_key(key), LoopControl::Continue);
        }
        assert_eq!(chat.session().phase(), Phase::Fatal);
        assert!(!chat.has_active_stream());
        assert_eq!(chat.handle_key(KeyInput::Quit), LoopControl::Exit);
    }
}
