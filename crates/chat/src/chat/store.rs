use snafu::{Snafu, ensure};

use super::message::{Message, MessageId};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("composing placeholder {existing} is already present"))]
    ComposingAlreadyPresent {
        stage: &'static str,
        existing: MessageId,
    },
    #[snafu(display("no composing placeholder to resolve"))]
    NoComposingPlaceholder { stage: &'static str },
    #[snafu(display("message {message_id} is a composing placeholder, refused on `{stage}`"))]
    UnexpectedPlaceholder {
        stage: &'static str,
        message_id: MessageId,
    },
    #[snafu(display("message {message_id} is not a composing placeholder, refused on `{stage}`"))]
    NotAPlaceholder {
        stage: &'static str,
        message_id: MessageId,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Authoritative, append-only message log.
///
/// At most one composing placeholder exists at a time, and replacing it keeps its
/// position in the log.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a finished message. Placeholders go through
    /// [`Self::append_composing_placeholder`].
    pub fn append(&mut self, message: Message) -> StoreResult<()> {
        ensure!(
            !message.is_composing(),
            UnexpectedPlaceholderSnafu {
                stage: "append-message",
                message_id: message.id,
            }
        );

        self.messages.push(message);
        Ok(())
    }

    pub fn append_composing_placeholder(&mut self, placeholder: Message) -> StoreResult<()> {
        ensure!(
            placeholder.is_composing(),
            NotAPlaceholderSnafu {
                stage: "append-composing-placeholder",
                message_id: placeholder.id,
            }
        );
        if let Some(existing) = self.composing() {
            return ComposingAlreadyPresentSnafu {
                stage: "append-composing-placeholder",
                existing: existing.id,
            }
            .fail();
        }

        self.messages.push(placeholder);
        Ok(())
    }

    /// Swaps the composing placeholder for `final_message` in place.
    pub fn resolve_composing(&mut self, final_message: Message) -> StoreResult<MessageId> {
        ensure!(
            !final_message.is_composing(),
            UnexpectedPlaceholderSnafu {
                stage: "resolve-composing",
                message_id: final_message.id,
            }
        );
        let Some(position) = self.messages.iter().position(Message::is_composing) else {
            return NoComposingPlaceholderSnafu {
                stage: "resolve-composing",
            }
            .fail();
        };
        let placeholder_id = self.messages[position].id;
        self.messages[position] = final_message;
        Ok(placeholder_id)
    }

    pub fn composing(&self) -> Option<&Message> {
        self.messages.iter().find(|message| message.is_composing())
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_llm::RequestId;

    #[test]
    fn second_placeholder_is_refused_without_mutation() {
        let mut store = MessageStore::new();
        store
            .append(Message::user(MessageId::new(1), "hi"))
            .expect("user message accepted");
        store
            .append_composing_placeholder(Message::composing(MessageId::new(2), RequestId::new(1)))
            .expect("first placeholder accepted");

        let error = store
            .append_composing_placeholder(Message::composing(MessageId::new(3), RequestId::new(2)))
            .expect_err("second placeholder refused");

        assert!(matches!(
            error,
            StoreError::ComposingAlreadyPresent { existing, .. } if existing == MessageId::new(2)
        ));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn resolve_replaces_placeholder_at_same_position() {
        let mut store = MessageStore::new();
        store
            .append(Message::user(MessageId::new(1), "hi"))
            .expect("user message accepted");
        store
            .append_composing_placeholder(Message::composing(MessageId::new(2), RequestId::new(1)))
            .expect("placeholder accepted");

        let replaced = store
            .resolve_composing(Message::assistant(MessageId::new(3), "hello"))
            .expect("placeholder resolved");

        assert_eq!(replaced, MessageId::new(2));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].id, MessageId::new(3));
        assert_eq!(snapshot[1].content, "hello");
        assert!(store.composing().is_none());
    }

    #[test]
    fn resolve_without_placeholder_leaves_log_untouched() {
        let mut store = MessageStore::new();
        store
            .append(Message::user(MessageId::new(1), "hi"))
            .expect("user message accepted");
        let before = store.snapshot();

        let result = store.resolve_composing(Message::assistant(MessageId::new(2), "late"));

        assert!(matches!(
            result,
            Err(StoreError::NoComposingPlaceholder { .. })
        ));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn append_refuses_placeholders() {
        let mut store = MessageStore::new();
        store
            .append_composing_placeholder(Message::composing(MessageId::new(1), RequestId::new(1)))
            .expect("placeholder accepted");

        let error = store
            .append(Message::composing(MessageId::new(2), RequestId::new(2)))
            .expect_err("placeholder refused by plain append");

        assert!(matches!(
            error,
            StoreError::UnexpectedPlaceholder { message_id, .. } if message_id == MessageId::new(2)
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.messages().iter().filter(|m| m.is_composing()).count(),
            1
        );
    }

    #[test]
    fn placeholder_slot_refuses_finished_message() {
        let mut store = MessageStore::new();

        let error = store
            .append_composing_placeholder(Message::assistant(MessageId::new(1), "done"))
            .expect_err("finished message is not a placeholder");

        assert!(matches!(error, StoreError::NotAPlaceholder { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn resolve_refuses_another_placeholder() {
        let mut store = MessageStore::new();
        store
            .append_composing_placeholder(Message::composing(MessageId::new(1), RequestId::new(1)))
            .expect("placeholder accepted");
        let before = store.snapshot();

        let result = store.resolve_composing(Message::composing(MessageId::new(2), RequestId::new(9)));

        assert!(matches!(
            result,
            Err(StoreError::UnexpectedPlaceholder { .. })
        ));
        assert_eq!(store.snapshot(), before);
    }
}
