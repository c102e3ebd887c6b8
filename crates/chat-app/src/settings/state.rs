use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use assistant_llm::{
    DEFAULT_GEMINI_MODEL, DEFAULT_SYSTEM_INSTRUCTION, Model, ProviderConfig,
    RIG_GEMINI_PROVIDER_ID, SessionOptions, resolve_model,
};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "gemini-assistant";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
/// Prefix for environment overrides of any settings field, e.g. `ASSISTANT_MODEL`.
pub const ENV_PREFIX: &str = "ASSISTANT_";
pub const API_KEY_ENV: &str = "API_KEY";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default = "default_color")]
    pub color: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: String::new(),
            model: default_model(),
            system_instruction: default_system_instruction(),
            temperature: None,
            max_tokens: None,
            color: default_color(),
        }
    }
}

impl ProviderSettings {
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(&self.provider_id, &self.api_key, &self.endpoint)
    }

    pub fn to_session_options(&self) -> SessionOptions {
        let mut options = SessionOptions::new(&self.model, &self.system_instruction);
        if let Some(temperature) = self.temperature {
            options = options.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }
        options
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// API key with everything but the last four characters hidden.
    pub fn masked_api_key(&self) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return "(not set)".to_string();
        }

        let visible = key
            .char_indices()
            .rev()
            .nth(3)
            .map(|(index, _)| &key[index..])
            .unwrap_or("");
        format!("****{visible}")
    }

    pub fn selected_model(&self) -> Model {
        resolve_model(&self.model)
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = if self.provider_id.trim().is_empty() {
            default_provider_id()
        } else {
            self.provider_id.trim().to_string()
        };
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = self.endpoint.trim().to_string();
        self.model = if self.model.trim().is_empty() {
            default_model()
        } else {
            self.model.trim().to_string()
        };
        if self.system_instruction.trim().is_empty() {
            self.system_instruction = default_system_instruction();
        }
        self.max_tokens = self.max_tokens.filter(|value| *value > 0);

        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ProviderSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".gemini-assistant"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_effective(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Effective settings: defaults, then the settings file, then environment.
    pub fn settings(&self) -> Arc<ProviderSettings> {
        self.settings.load_full()
    }

    /// Applies `edit` to the file layer only and persists it.
    ///
    /// Environment overrides are never written back, so a key taken from
    /// `GEMINI_API_KEY` does not end up on disk.
    pub fn update_file<F>(&self, edit: F) -> Result<ProviderSettings, SettingsError>
    where
        F: FnOnce(&mut ProviderSettings),
    {
        let mut file_settings = Self::file_figment(&self.config_path)
            .extract::<ProviderSettings>()
            .context(ExtractSnafu {
                stage: "extract-file-settings",
                path: self.config_path.clone(),
            })?;
        edit(&mut file_settings);
        let file_settings = file_settings.normalized();

        self.persist(&file_settings)?;
        self.settings
            .store(Arc::new(Self::load_effective(&self.config_path)));
        Ok(file_settings)
    }

    fn file_figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(ProviderSettings::default())).merge(Json::file(path))
    }

    fn effective_figment(path: &Path) -> Figment {
        Self::file_figment(path)
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Env::raw().only(&[API_KEY_ENV]).map(|_| "api_key".into()))
            .merge(
                Env::raw()
                    .only(&[GEMINI_API_KEY_ENV])
                    .map(|_| "api_key".into()),
            )
    }

    fn load_effective(path: &Path) -> ProviderSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        match Self::effective_figment(path).extract::<ProviderSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ProviderSettings::default()
            }
        }
    }

    fn persist(&self, settings: &ProviderSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to read settings from {path:?} on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        path: PathBuf,
        #[snafu(source(from(figment::Error, Box::new)))]
        source: Box<figment::Error>,
    },
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_provider_id() -> String {
    RIG_GEMINI_PROVIDER_ID.to_string()
}

fn default_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_system_instruction() -> String {
    DEFAULT_SYSTEM_INSTRUCTION.to_string()
}

fn default_color() -> bool {
    true
}
