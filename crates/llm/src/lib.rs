use std::sync::Arc;

mod model;
mod provider;
mod rig_adapter;
mod session;

pub use model::{
    DEFAULT_GEMINI_MODEL, DEFAULT_SYSTEM_INSTRUCTION, Model, default_gemini_models, resolve_model,
};
pub use provider::{
    LlmProvider, ProviderConfig, ProviderError, ProviderEventStream, ProviderMessage,
    ProviderResult, ProviderStreamHandle, ProviderWorker, Role, SessionGeneration,
    StreamEventMapped, StreamEventPayload, StreamRequest, StreamTarget, TurnId,
    make_event_stream,
};
pub use rig_adapter::{RIG_GEMINI_PROVIDER_ID, RigProviderAdapter};
pub use session::{ChatClient, ReplyStream, SessionOptions};

pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "gemini" | "google" | "rig-gemini" => {
            config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigProviderAdapter::new(config)))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}
