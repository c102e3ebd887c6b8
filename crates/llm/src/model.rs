#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Persona preamble sent as the system instruction of every session.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful, intelligent, and concise AI assistant named Gemini. You provide clear, accurate answers and can format text using Markdown when appropriate.";

pub fn default_gemini_models() -> Vec<Model> {
    vec![
        Model::new("gemini-2.5-flash", "Gemini 2.5 Flash")
            .with_description("Fast general model, default"),
        Model::new("gemini-2.5-pro", "Gemini 2.5 Pro")
            .with_description("Higher quality reasoning model"),
        Model::new("gemini-2.5-flash-lite", "Gemini 2.5 Flash-Lite")
            .with_description("Lowest latency and cost"),
    ]
}

/// Looks up a known model by id, falling back to a bare entry for custom ids.
pub fn resolve_model(model_id: &str) -> Model {
    let model_id = model_id.trim();
    default_gemini_models()
        .into_iter()
        .find(|model| model.id == model_id)
        .unwrap_or_else(|| Model::from_id(model_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_listed() {
        assert!(
            default_gemini_models()
                .iter()
                .any(|model| model.id == DEFAULT_GEMINI_MODEL)
        );
    }

    #[test]
    fn unknown_model_resolves_without_description() {
        let model = resolve_model("  gemini-experimental ");
        assert_eq!(model.id, "gemini-experimental");
        assert_eq!(model.description, None);

        let known = resolve_model(DEFAULT_GEMINI_MODEL);
        assert!(known.description.is_some());
    }

    #[test]
    fn known_models_carry_display_names() {
        assert_eq!(resolve_model(DEFAULT_GEMINI_MODEL).name, "Gemini 2.5 Flash");
        assert_eq!(resolve_model(" my-tuned-model ").name, "my-tuned-model");
    }
}
