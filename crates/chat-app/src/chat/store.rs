use crate::chat::events::{StoreChange, StoreObserver};
use crate::chat::message::{Message, MessageId, MessageStatus, Role};

/// Everything the render layer needs to draw the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub is_loading: bool,
}

impl ChatState {
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }
}

/// Observable ordered list of messages for one session.
///
/// Mutators enforce the message invariants: only an in-progress assistant
/// message accepts new content, and it stops accepting once finalized or failed.
#[derive(Default)]
pub struct MessageStore {
    state: ChatState,
    observers: Vec<Box<dyn StoreObserver>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn StoreObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading
    }

    pub fn len(&self) -> usize {
        self.state.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        let id = message.id;
        self.state.messages.push(message);
        self.publish(StoreChange::MessageAppended(id));
    }

    pub fn append_content(&mut self, id: MessageId, fragment: &str) -> bool {
        let Some(message) = self.streaming_message_mut(id) else {
            return false;
        };

        message.content.push_str(fragment);
        self.publish(StoreChange::ContentAppended {
            id,
            fragment: fragment.to_string(),
        });
        true
    }

    pub fn finalize(&mut self, id: MessageId) -> bool {
        let Some(message) = self.streaming_message_mut(id) else {
            return false;
        };

        message.status = MessageStatus::Done;
        self.publish(StoreChange::MessageFinalized(id));
        true
    }

    /// Replaces the partial reply with `notice` and marks the message failed.
    pub fn fail(&mut self, id: MessageId, notice: &str) -> bool {
        let Some(message) = self.streaming_message_mut(id) else {
            return false;
        };

        message.content = notice.to_string();
        message.status = MessageStatus::Error;
        self.publish(StoreChange::MessageFailed(id));
        true
    }

    pub fn set_loading(&mut self, loading: bool) {
        if self.state.is_loading == loading {
            return;
        }

        self.state.is_loading = loading;
        self.publish(StoreChange::LoadingChanged(loading));
    }

    pub fn clear(&mut self) {
        self.state.messages.clear();
        self.state.is_loading = false;
        self.publish(StoreChange::Cleared);
    }

    fn streaming_message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        let message = self
            .state
            .messages
            .iter_mut()
            .find(|message| message.id == id);

        match message {
            Some(message) if message.role == Role::Assistant && message.in_progress() => {
                Some(message)
            }
            Some(message) => {
                tracing::warn!(
                    message_id = id.0,
                    role = ?message.role,
                    status = ?message.status,
                    "ignoring mutation of a frozen message"
                );
                None
            }
            None => {
                tracing::warn!(message_id = id.0, "ignoring mutation of an unknown message");
                None
            }
        }
    }

    fn publish(&mut self, change: StoreChange) {
        for observer in &mut self.observers {
            observer.on_change(&change, &self.state);
        }
    }
}
