use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures::Stream;
use snafu::ensure;

use super::model::{DEFAULT_GEMINI_MODEL, DEFAULT_SYSTEM_INSTRUCTION};
use super::provider::{
    EmptyPromptSnafu, LlmProvider, ProviderError, ProviderEventStream, ProviderMessage,
    ProviderResult, Role, SessionGeneration, SessionUnavailableSnafu, StreamEventPayload,
    StreamRequest, StreamTarget, TurnId,
};

/// Fixed parameters every session is (re)started with.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub model_id: String,
    pub system_instruction: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_GEMINI_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl SessionOptions {
    pub fn new(model_id: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            system_instruction: system_instruction.into(),
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

struct ChatSession {
    generation: SessionGeneration,
    history: Vec<ProviderMessage>,
}

impl ChatSession {
    fn record_turn(&mut self, prompt: String, reply: String) {
        self.history.push(ProviderMessage::new(Role::User, prompt));
        self.history.push(ProviderMessage::new(Role::Assistant, reply));
    }
}

/// Streaming client owning at most one conversation session with the provider.
///
/// Each [`send`](Self::send) turns one user prompt into a [`ReplyStream`] of
/// text fragments. Completed turns are kept as session history and replayed
/// to the provider on the next turn; [`start`](Self::start) discards them.
pub struct ChatClient {
    provider: Arc<dyn LlmProvider>,
    options: SessionOptions,
    session: Option<ChatSession>,
    next_generation: u64,
    next_turn: u64,
}

impl ChatClient {
    pub fn new(provider: Arc<dyn LlmProvider>, options: SessionOptions) -> Self {
        Self {
            provider,
            options,
            session: None,
            next_generation: 1,
            next_turn: 1,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.options.model_id
    }

    /// Display name of the backing provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn session_generation(&self) -> Option<SessionGeneration> {
        self.session.as_ref().map(|session| session.generation)
    }

    pub fn history_len(&self) -> usize {
        self.session
            .as_ref()
            .map(|session| session.history.len())
            .unwrap_or(0)
    }

    /// Replaces the current session with an empty one.
    pub fn start(&mut self) {
        let generation = SessionGeneration::new(self.next_generation);
        self.next_generation = self.next_generation.saturating_add(1);

        tracing::debug!(
            generation = generation.0,
            provider_id = %self.provider.id(),
            model_id = %self.options.model_id,
            "starting chat session"
        );

        self.session = Some(ChatSession {
            generation,
            history: Vec::new(),
        });
    }

    /// Sends one prompt and returns the lazy sequence of reply fragments.
    ///
    /// Must be called from within a tokio runtime: the provider worker is
    /// spawned onto it.
    pub fn send(&mut self, text: &str) -> ProviderResult<ReplyStream<'_>> {
        ensure!(
            !text.trim().is_empty(),
            EmptyPromptSnafu {
                stage: "chat-client-send",
            }
        );

        if self.session.is_none() {
            self.start();
        }

        let turn = TurnId::new(self.next_turn);
        self.next_turn = self.next_turn.saturating_add(1);

        let provider = Arc::clone(&self.provider);
        let options = self.options.clone();
        let Some(session) = self.session.as_mut() else {
            return SessionUnavailableSnafu {
                stage: "chat-client-send",
            }
            .fail();
        };

        let target = StreamTarget::new(session.generation, turn);
        let mut messages = session.history.clone();
        messages.push(ProviderMessage::new(Role::User, text));

        let mut request = StreamRequest::new(target, options.model_id.clone(), messages)
            .with_preamble(options.system_instruction.clone());
        if let Some(temperature) = options.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        tracing::debug!(
            target = ?target,
            model_id = %options.model_id,
            history_len = session.history.len(),
            "sending prompt to provider"
        );

        let handle = provider.stream_chat(request)?;
        tokio::spawn(handle.worker);

        Ok(ReplyStream {
            events: handle.stream,
            session,
            prompt: text.to_string(),
            reply: String::new(),
            finished: false,
        })
    }
}

/// One turn's reply as an ordered, finite, non-restartable fragment stream.
///
/// Yields non-empty fragments in provider emission order. A failure is
/// yielded once as `Err` and ends the stream. Dropping the stream cancels the
/// provider worker and leaves the turn out of the session history.
pub struct ReplyStream<'a> {
    events: ProviderEventStream,
    session: &'a mut ChatSession,
    prompt: String,
    reply: String,
    finished: bool,
}

impl Stream for ReplyStream<'_> {
    type Item = ProviderResult<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            let Some(event) = ready!(this.events.poll_recv(cx)) else {
                this.finished = true;
                tracing::warn!(
                    target = ?this.events.target(),
                    "provider worker exited without a terminal event"
                );
                return Poll::Ready(Some(Err(ProviderError::StreamInterrupted {
                    stage: "reply-stream-closed",
                })));
            };

            if event.target != this.events.target() {
                tracing::debug!(
                    expected = ?this.events.target(),
                    received = ?event.target,
                    "dropping stale provider event"
                );
                continue;
            }

            match event.payload {
                StreamEventPayload::Delta(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    this.reply.push_str(&text);
                    return Poll::Ready(Some(Ok(text)));
                }
                StreamEventPayload::Done => {
                    this.finished = true;
                    let prompt = std::mem::take(&mut this.prompt);
                    let reply = std::mem::take(&mut this.reply);
                    this.session.record_turn(prompt, reply);
                    return Poll::Ready(None);
                }
                StreamEventPayload::Error(message) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(ProviderError::Stream {
                        stage: "reply-stream-event",
                        message,
                    })));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::StreamExt;

    use super::*;
    use crate::provider::{ProviderStreamHandle, ProviderWorker, StreamEventMapped, make_event_stream};

    enum Ending {
        Done,
        Fail(&'static str),
        Hangup,
    }

    struct Script {
        fragments: Vec<&'static str>,
        ending: Ending,
    }

    /// Replays scripted turns and records every request it receives.
    struct ScriptedProvider {
        scripts: Mutex<Vec<Script>>,
        requests: Mutex<Vec<StreamRequest>>,
    }

    impl ScriptedProvider {
        fn new(mut scripts: Vec<Script>) -> Arc<Self> {
            scripts.reverse();
            Arc::new(Self {
                scripts: Mutex::new(scripts),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<StreamRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }

        fn name(&self) -> &str {
            "Scripted"
        }

        fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
            let target = request.target;
            self.requests.lock().unwrap().push(request);
            let script = self.scripts.lock().unwrap().pop().expect("unscripted turn");

            let (event_tx, stream, _cancel_rx) = make_event_stream(target);
            let worker: ProviderWorker = Box::pin(async move {
                for fragment in script.fragments {
                    let _ = event_tx.send(StreamEventMapped::delta(target, fragment));
                }
                match script.ending {
                    Ending::Done => {
                        let _ = event_tx.send(StreamEventMapped::done(target));
                    }
                    Ending::Fail(message) => {
                        let _ = event_tx.send(StreamEventMapped::error(target, message));
                    }
                    Ending::Hangup => {}
                }
            });

            Ok(ProviderStreamHandle { stream, worker })
        }
    }

    fn done(fragments: Vec<&'static str>) -> Script {
        Script {
            fragments,
            ending: Ending::Done,
        }
    }

    async fn collect(stream: ReplyStream<'_>) -> Vec<ProviderResult<String>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn send_yields_fragments_in_order_and_records_history() {
        let provider = ScriptedProvider::new(vec![done(vec!["Hi", "", " there", "!"])]);
        let mut client = ChatClient::new(provider.clone(), SessionOptions::default());

        let items = collect(client.send("Hello").unwrap()).await;
        let fragments = items
            .into_iter()
            .map(|item| item.unwrap())
            .collect::<Vec<_>>();

        assert_eq!(fragments, vec!["Hi", " there", "!"]);
        assert_eq!(client.history_len(), 2);

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model_id, DEFAULT_GEMINI_MODEL);
        assert_eq!(
            requests[0].preamble.as_deref(),
            Some(DEFAULT_SYSTEM_INSTRUCTION)
        );
    }

    #[tokio::test]
    async fn send_without_start_creates_a_session() {
        let provider = ScriptedProvider::new(vec![done(vec!["ok"])]);
        let mut client = ChatClient::new(provider, SessionOptions::default());
        assert_eq!(client.session_generation(), None);

        let _ = collect(client.send("ping").unwrap()).await;
        assert_eq!(client.session_generation(), Some(SessionGeneration::new(1)));
    }

    #[tokio::test]
    async fn completed_turns_are_replayed_on_the_next_send() {
        let provider = ScriptedProvider::new(vec![done(vec!["Hi"]), done(vec!["Fine"])]);
        let mut client = ChatClient::new(provider.clone(), SessionOptions::default());

        let _ = collect(client.send("Hello").unwrap()).await;
        let _ = collect(client.send("How are you?").unwrap()).await;

        let second = &provider.requests()[1];
        let contents = second
            .messages
            .iter()
            .map(|message| (message.role, message.content.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            contents,
            vec![
                (Role::User, "Hello"),
                (Role::Assistant, "Hi"),
                (Role::User, "How are you?"),
            ]
        );
    }

    #[tokio::test]
    async fn failure_after_fragments_ends_the_stream_and_skips_history() {
        let provider = ScriptedProvider::new(vec![Script {
            fragments: vec!["Par"],
            ending: Ending::Fail("quota exceeded"),
        }]);
        let mut client = ChatClient::new(provider, SessionOptions::default());

        let items = collect(client.send("Test").unwrap()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "Par");
        assert!(matches!(
            &items[1],
            Err(ProviderError::Stream { message, .. }) if message == "quota exceeded"
        ));
        assert_eq!(client.history_len(), 0);
    }

    #[tokio::test]
    async fn worker_exit_without_terminal_event_is_an_error() {
        let provider = ScriptedProvider::new(vec![Script {
            fragments: vec!["half"],
            ending: Ending::Hangup,
        }]);
        let mut client = ChatClient::new(provider, SessionOptions::default());

        let items = collect(client.send("Test").unwrap()).await;
        assert!(matches!(
            items.last(),
            Some(Err(ProviderError::StreamInterrupted { .. }))
        ));
    }

    #[tokio::test]
    async fn start_discards_history_and_bumps_generation() {
        let provider = ScriptedProvider::new(vec![done(vec!["Hi"]), done(vec!["Hello again"])]);
        let mut client = ChatClient::new(provider.clone(), SessionOptions::default());

        let _ = collect(client.send("Hello").unwrap()).await;
        client.start();
        assert_eq!(client.history_len(), 0);
        assert_eq!(client.session_generation(), Some(SessionGeneration::new(2)));

        let _ = collect(client.send("Hello").unwrap()).await;
        let second = &provider.requests()[1];
        assert_eq!(second.messages.len(), 1);
        assert_eq!(second.target.generation, SessionGeneration::new(2));
    }

    #[test]
    fn blank_prompt_is_rejected() {
        let provider = ScriptedProvider::new(Vec::new());
        let mut client = ChatClient::new(provider, SessionOptions::default());
        assert!(matches!(
            client.send("   "),
            Err(ProviderError::EmptyPrompt { .. })
        ));
    }
}
