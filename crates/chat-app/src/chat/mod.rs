/// Turn orchestration over the store and the streaming client.
pub mod controller;
/// Event contracts between the store and its observers.
pub mod events;
/// Domain entities and the per-turn state machine.
pub mod message;
pub mod message_input;
pub mod render;
pub mod store;

pub use controller::{ConversationController, ERROR_NOTICE, TurnOutcome};
pub use events::{StoreChange, StoreObserver, Submit};
pub use message::{
    Message, MessageId, MessageStatus, Role, TurnId, TurnState, TurnTransition,
    TurnTransitionRejection, TurnTransitionResult,
};
pub use message_input::{Command, InputAction, MessageInput};
pub use render::{RenderOptions, TerminalRenderer, render_transcript};
pub use store::{ChatState, MessageStore};
