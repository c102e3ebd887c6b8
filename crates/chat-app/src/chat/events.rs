use crate::chat::message::{MessageId, TurnId, TurnTransition};
use crate::chat::store::ChatState;

/// Emitted when the user submits a prompt to generate a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submit {
    pub turn: TurnId,
    pub content: String,
}

impl Submit {
    /// Creates a submit event for an explicit turn.
    pub fn new(turn: TurnId, content: impl Into<String>) -> Self {
        Self {
            turn,
            content: content.into(),
        }
    }

    /// Returns the transition that opens the turn.
    pub fn start_transition(&self) -> TurnTransition {
        TurnTransition::Submit(self.turn)
    }
}

/// One mutation of the message store, published to every observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    MessageAppended(MessageId),
    ContentAppended { id: MessageId, fragment: String },
    MessageFinalized(MessageId),
    MessageFailed(MessageId),
    LoadingChanged(bool),
    Cleared,
}

/// Render-side subscriber of the message store.
///
/// Called synchronously after every mutation with the state already updated.
pub trait StoreObserver: Send {
    fn on_change(&mut self, change: &StoreChange, state: &ChatState);
}
