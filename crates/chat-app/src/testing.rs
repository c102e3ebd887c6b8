use std::sync::{Arc, Mutex};

use assistant_llm::{
    LlmProvider, ProviderError, ProviderResult, ProviderStreamHandle, ProviderWorker,
    StreamEventMapped, StreamRequest, make_event_stream,
};

/// Scripted reply for one turn.
pub(crate) enum Reply {
    Stream(Vec<&'static str>),
    FailAfter(Vec<&'static str>),
    RefuseToOpen,
}

/// In-process provider that replays one scripted reply per request.
pub(crate) struct ScriptedProvider {
    replies: Mutex<Vec<Reply>>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedProvider {
    pub(crate) fn new(mut replies: Vec<Reply>) -> Arc<Self> {
        replies.reverse();
        Arc::new(Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<StreamRequest> {
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
        let reply = self.replies.lock().unwrap().pop().expect("unscripted turn");
        let (fragments, fail) = match reply {
            Reply::Stream(fragments) => (fragments, false),
            Reply::FailAfter(fragments) => (fragments, true),
            Reply::RefuseToOpen => {
                return Err(ProviderError::MissingApiKey {
                    stage: "scripted",
                    provider_id: "scripted".to_string(),
                });
            }
        };

        let (event_tx, stream, _cancel_rx) = make_event_stream(target);
        let worker: ProviderWorker = Box::pin(async move {
            for fragment in fragments {
                let _ = event_tx.send(StreamEventMapped::delta(target, fragment));
                tokio::task::yield_now().await;
            }
            let terminal = if fail {
                StreamEventMapped::error(target, "upstream reset")
            } else {
                StreamEventMapped::done(target)
            };
            let _ = event_tx.send(terminal);
        });

        Ok(ProviderStreamHandle { stream, worker })
    }
}
