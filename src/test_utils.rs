use std::sync::{Arc, Mutex};

use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::core::gateway::{CompletionGateway, DeltaStream, GatewayError};
use crate::core::message::Message;

type Step = Result<String, GatewayError>;

/// Gateway that replays a fixed list of items on every submission and records
/// the histories it was given.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    steps: Vec<Step>,
    submissions: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ScriptedGateway {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            submissions: Arc::default(),
        }
    }

    pub fn submissions(&self) -> Vec<Vec<Message>> {
        self.submissions.lock().expect("submissions lock").clone()
    }
}

impl CompletionGateway for ScriptedGateway {
    fn submit(&self, history: &[Message]) -> DeltaStream {
        self.submissions
            .lock()
            .expect("submissions lock")
            .push(history.to_vec());
        stream::iter(self.steps.clone()).boxed()
    }
}

/// Gateway whose single stream is fed by the test through a channel. The
/// stream ends when the feeding sender is dropped.
pub struct ChannelGateway {
    feed: Mutex<Option<mpsc::UnboundedReceiver<Step>>>,
}

impl ChannelGateway {
    pub fn new() -> (Self, mpsc::UnboundedSender<Step>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                feed: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

impl CompletionGateway for ChannelGateway {
    fn submit(&self, _history: &[Message]) -> DeltaStream {
        let rx = self
            .feed
            .lock()
            .expect("feed lock")
            .take()
            .expect("ChannelGateway supports a single submission");
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|step| (step, rx)) }).boxed()
    }
}
