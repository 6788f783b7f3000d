use crate::core::message::Message;

/// Ordered, append-only record of the conversation.
///
/// Messages can be read back in order but never edited or removed, so the
/// history handed to the gateway is always a prefix-stable snapshot.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Owned copy of the history, in order, for handing to a producer task.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_append_order() {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("hi"));
        transcript.push(Message::assistant("Hello"));

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0], Message::user("hi"));
        assert_eq!(transcript.last(), Some(&Message::assistant("Hello")));
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("first"));
        let snapshot = transcript.snapshot();
        transcript.push(Message::user("second"));

        assert_eq!(snapshot, vec![Message::user("first")]);
        assert_eq!(transcript.len(), 2);
    }
}
