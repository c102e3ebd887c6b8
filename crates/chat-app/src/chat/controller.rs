use assistant_llm::ChatClient;
use futures::StreamExt;

use crate::chat::events::{StoreObserver, Submit};
use crate::chat::message::{Message, MessageId, TurnId, TurnState, TurnTransition};
use crate::chat::store::MessageStore;

/// Apology shown in place of a reply whose stream failed.
pub const ERROR_NOTICE: &str = "I'm sorry, I encountered an error processing your request.";

/// How one call to [`ConversationController::submit`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input; nothing was recorded.
    Ignored,
    /// Another turn is still in flight; the submission was rejected.
    Busy,
    Completed {
        message_id: MessageId,
    },
    Failed {
        message_id: MessageId,
        reason: String,
    },
}

/// Sole writer of the message store; runs the per-turn protocol.
pub struct ConversationController {
    client: ChatClient,
    store: MessageStore,
    turn_state: TurnState,
    next_message_id: u64,
    next_turn_id: u64,
}

impl ConversationController {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            store: MessageStore::new(),
            turn_state: TurnState::Idle,
            next_message_id: 1,
            next_turn_id: 1,
        }
    }

    /// Starts a fresh provider session, mirroring what the shell does on launch.
    pub fn start(&mut self) {
        self.client.start();
    }

    pub fn subscribe(&mut self, observer: Box<dyn StoreObserver>) {
        self.store.subscribe(observer);
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub fn turn_state(&self) -> &TurnState {
        &self.turn_state
    }

    /// Runs one full turn: record the prompt, stream the reply into a
    /// placeholder and finalize it or replace it with [`ERROR_NOTICE`].
    pub async fn submit(&mut self, text: &str) -> TurnOutcome {
        if text.trim().is_empty() {
            return TurnOutcome::Ignored;
        }

        let event = Submit::new(self.alloc_turn_id(), text);
        match self.turn_state.apply(event.start_transition()) {
            Ok(next) => self.turn_state = next,
            Err(rejection) => {
                tracing::warn!(?rejection, "rejecting submission while a turn is in flight");
                return TurnOutcome::Busy;
            }
        }

        let user_message_id = self.alloc_message_id();
        let assistant_message_id = self.alloc_message_id();

        self.store.set_loading(true);
        self.store.push(Message::user(user_message_id, event.content.clone()));
        self.store.push(Message::assistant_placeholder(assistant_message_id));

        tracing::info!(
            turn = event.turn.0,
            message_id = assistant_message_id.0,
            prompt_len = event.content.len(),
            "turn submitted"
        );

        let result = self.stream_reply(event.turn, &event.content, assistant_message_id).await;
        let outcome = match result {
            Ok(()) => {
                self.transition(TurnTransition::Complete(event.turn));
                self.store.finalize(assistant_message_id);
                tracing::info!(turn = event.turn.0, "turn completed");
                TurnOutcome::Completed {
                    message_id: assistant_message_id,
                }
            }
            Err(reason) => {
                tracing::error!(turn = event.turn.0, error = %reason, "turn failed");
                self.transition(TurnTransition::Fail {
                    turn: event.turn,
                    reason: reason.clone(),
                });
                self.store.fail(assistant_message_id, ERROR_NOTICE);
                TurnOutcome::Failed {
                    message_id: assistant_message_id,
                    reason,
                }
            }
        };

        self.store.set_loading(false);
        outcome
    }

    /// Clears the conversation and discards provider-side context.
    pub fn reset(&mut self) {
        tracing::info!(message_count = self.store.len(), "resetting conversation");
        self.store.clear();
        self.client.start();
        self.transition(TurnTransition::Reset);
    }

    async fn stream_reply(
        &mut self,
        turn: TurnId,
        prompt: &str,
        message_id: MessageId,
    ) -> Result<(), String> {
        let mut stream = self.client.send(prompt).map_err(|error| error.to_string())?;

        match self.turn_state.apply(TurnTransition::BeginStream(turn)) {
            Ok(next) => self.turn_state = next,
            Err(rejection) => {
                return Err(format!("turn state rejected stream start: {rejection:?}"));
            }
        }

        let mut fragment_count = 0usize;
        while let Some(item) = stream.next().await {
            let fragment = item.map_err(|error| error.to_string())?;
            fragment_count += 1;
            self.store.append_content(message_id, &fragment);
        }

        tracing::debug!(turn = turn.0, fragment_count, "reply stream exhausted");
        Ok(())
    }

    fn transition(&mut self, transition: TurnTransition) {
        match self.turn_state.apply(transition) {
            Ok(next) => self.turn_state = next,
            Err(rejection) => {
                tracing::warn!(?rejection, state = ?self.turn_state, "illegal turn transition");
            }
        }
    }

    fn alloc_message_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id = self.next_message_id.saturating_add(1);
        id
    }

    fn alloc_turn_id(&mut self) -> TurnId {
        let id = TurnId::new(self.next_turn_id);
        self.next_turn_id = self.next_turn_id.saturating_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};

    use assistant_llm::SessionOptions;

    use super::*;
    use crate::chat::events::StoreChange;
    use crate::chat::message::{MessageStatus, Role};
    use crate::chat::store::ChatState;
    use crate::testing::{Reply, ScriptedProvider};

    /// Captures each change together with the loading flag at that moment.
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(StoreChange, bool)>>>);

    impl StoreObserver for Recorder {
        fn on_change(&mut self, change: &StoreChange, state: &ChatState) {
            self.0
                .lock()
                .unwrap()
                .push((change.clone(), state.is_loading));
        }
    }

    fn controller(replies: Vec<Reply>) -> (ConversationController, Recorder) {
        let client = ChatClient::new(ScriptedProvider::new(replies), SessionOptions::default());
        let mut controller = ConversationController::new(client);
        controller.start();
        let recorder = Recorder::default();
        controller.subscribe(Box::new(recorder.clone()));
        (controller, recorder)
    }

    fn summary(controller: &ConversationController) -> Vec<(Role, String, MessageStatus)> {
        controller
            .store()
            .messages()
            .iter()
            .map(|message| (message.role, message.content.clone(), message.status))
            .collect()
    }

    #[tokio::test]
    async fn streamed_reply_is_concatenated_in_order() {
        let (mut controller, _recorder) =
            controller(vec![Reply::Stream(vec!["Hi", " there", "!"])]);

        let outcome = controller.submit("Hello").await;

        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                message_id: MessageId::new(2)
            }
        );
        assert_eq!(
            summary(&controller),
            vec![
                (Role::User, "Hello".to_string(), MessageStatus::Done),
                (Role::Assistant, "Hi there!".to_string(), MessageStatus::Done),
            ]
        );
        assert!(!controller.is_loading());
        assert_eq!(controller.turn_state(), &TurnState::Completed(TurnId::new(1)));
    }

    #[tokio::test]
    async fn failure_replaces_partial_reply_with_notice() {
        let (mut controller, _recorder) = controller(vec![Reply::FailAfter(vec!["Par"])]);

        let outcome = controller.submit("Test").await;

        assert!(matches!(
            outcome,
            TurnOutcome::Failed { message_id, .. } if message_id == MessageId::new(2)
        ));
        let assistant = &controller.store().messages()[1];
        assert_eq!(assistant.content, ERROR_NOTICE);
        assert!(!assistant.content.contains("Par"));
        assert!(assistant.is_error());
        assert!(!assistant.in_progress());
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn failure_before_first_fragment_is_handled_the_same_way() {
        let (mut controller, _recorder) =
            controller(vec![Reply::FailAfter(Vec::new()), Reply::RefuseToOpen]);

        assert!(matches!(controller.submit("one").await, TurnOutcome::Failed { .. }));
        assert!(matches!(controller.submit("two").await, TurnOutcome::Failed { .. }));

        let statuses = controller
            .store()
            .messages()
            .iter()
            .map(|message| message.status)
            .collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![
                MessageStatus::Done,
                MessageStatus::Error,
                MessageStatus::Done,
                MessageStatus::Error,
            ]
        );
    }

    #[tokio::test]
    async fn blank_input_changes_nothing() {
        let (mut controller, recorder) = controller(Vec::new());

        for input in ["", "   ", "\n\t"] {
            assert_eq!(controller.submit(input).await, TurnOutcome::Ignored);
        }

        assert!(controller.store().is_empty());
        assert!(!controller.is_loading());
        assert!(recorder.0.lock().unwrap().is_empty());
        assert_eq!(controller.turn_state(), &TurnState::Idle);
    }

    #[tokio::test]
    async fn loading_spans_exactly_the_turn() {
        let (mut controller, recorder) = controller(vec![
            Reply::Stream(vec!["a", "b"]),
            Reply::FailAfter(vec!["c"]),
        ]);

        controller.submit("first").await;
        controller.submit("second").await;

        let changes = recorder.0.lock().unwrap().clone();
        let mut loading = false;
        for (change, is_loading) in &changes {
            match change {
                StoreChange::LoadingChanged(value) => loading = *value,
                StoreChange::MessageAppended(_)
                | StoreChange::ContentAppended { .. }
                | StoreChange::MessageFinalized(_)
                | StoreChange::MessageFailed(_) => {
                    assert!(*is_loading, "{change:?} published while not loading");
                }
                StoreChange::Cleared => {}
            }
            assert_eq!(loading, *is_loading);
        }

        let toggles = changes
            .iter()
            .filter_map(|(change, _)| match change {
                StoreChange::LoadingChanged(value) => Some(*value),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(toggles, vec![true, false, true, false]);
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn loading_is_raised_before_the_turn_appears() {
        let (mut controller, recorder) = controller(vec![Reply::Stream(vec!["Hi"])]);

        controller.submit("Hello").await;

        let changes = recorder.0.lock().unwrap().clone();
        assert_eq!(changes[0], (StoreChange::LoadingChanged(true), true));
        let appended = changes
            .iter()
            .filter(|(change, _)| matches!(change, StoreChange::MessageAppended(_)))
            .collect::<Vec<_>>();
        assert_eq!(appended.len(), 2);
        assert!(appended.iter().all(|(_, is_loading)| *is_loading));
    }

    #[tokio::test]
    async fn each_submission_adds_exactly_one_pair() {
        let (mut controller, _recorder) = controller(vec![
            Reply::Stream(vec!["1"]),
            Reply::Stream(vec!["2"]),
            Reply::Stream(vec!["3"]),
        ]);

        for (index, prompt) in ["a", "b", "c"].into_iter().enumerate() {
            controller.submit(prompt).await;
            let messages = controller.store().messages();
            assert_eq!(messages.len(), (index + 1) * 2);
            assert_eq!(messages[index * 2].role, Role::User);
            assert_eq!(messages[index * 2 + 1].role, Role::Assistant);
        }

        let ids = controller
            .store()
            .messages()
            .iter()
            .map(|message| message.id)
            .collect::<BTreeSet<_>>();
        assert_eq!(ids.len(), 6);
    }

    #[tokio::test]
    async fn reset_clears_any_history_and_accepts_new_turns() {
        for turns in [0usize, 1, 3] {
            let mut replies = (0..turns)
                .map(|_| Reply::Stream(vec!["ok"]))
                .collect::<Vec<_>>();
            replies.push(Reply::Stream(vec!["fresh"]));
            let (mut controller, recorder) = controller(replies);

            for _ in 0..turns {
                controller.submit("hi").await;
            }
            let generation_before = controller.client().session_generation();

            controller.reset();

            assert!(controller.store().is_empty());
            assert_eq!(controller.turn_state(), &TurnState::Idle);
            assert_eq!(controller.client().history_len(), 0);
            assert_ne!(controller.client().session_generation(), generation_before);
            assert_eq!(
                recorder.0.lock().unwrap().last().map(|(change, _)| change.clone()),
                Some(StoreChange::Cleared)
            );

            let outcome = controller.submit("again").await;
            assert!(matches!(outcome, TurnOutcome::Completed { .. }));
            assert_eq!(controller.store().messages()[1].content, "fresh");
        }
    }

    #[tokio::test]
    async fn submission_while_in_flight_is_rejected() {
        let (mut controller, _recorder) = controller(Vec::new());
        controller.turn_state = TurnState::Streaming(TurnId::new(99));

        assert_eq!(controller.submit("queued?").await, TurnOutcome::Busy);
        assert!(controller.store().is_empty());
        assert!(!controller.is_loading());
    }
}
