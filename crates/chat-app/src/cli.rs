use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::settings::ProviderSettings;

#[derive(Debug, Parser)]
#[command(name = "assistant", version, about = "Chat with Gemini from your terminal")]
pub struct Cli {
    /// Settings file to use instead of the per-user default.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Model to chat with for this run only.
    #[arg(long, value_name = "ID")]
    pub model: Option<String>,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum Commands {
    /// Start an interactive conversation (default).
    Chat,
    /// Inspect or change the saved settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum ConfigAction {
    /// Print the effective settings with the API key masked.
    Show,
    /// Save settings to the settings file.
    Set {
        #[command(flatten)]
        changes: SettingsChanges,
    },
}

/// Fields `config set` may change. Absent flags leave the saved value alone.
#[derive(Debug, Default, Clone, Args, PartialEq)]
pub struct SettingsChanges {
    #[arg(long, value_name = "ID")]
    pub model: Option<String>,
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,
    #[arg(long, value_name = "TEXT")]
    pub system_instruction: Option<String>,
    #[arg(long)]
    pub temperature: Option<f64>,
    #[arg(long, value_name = "COUNT")]
    pub max_tokens: Option<u64>,
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,
}

impl SettingsChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(self, settings: &mut ProviderSettings) {
        if let Some(model) = self.model {
            settings.model = model;
        }
        if let Some(endpoint) = self.endpoint {
            settings.endpoint = endpoint;
        }
        if let Some(system_instruction) = self.system_instruction {
            settings.system_instruction = system_instruction;
        }
        if let Some(temperature) = self.temperature {
            settings.temperature = Some(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            settings.max_tokens = Some(max_tokens);
        }
        if let Some(api_key) = self.api_key {
            settings.api_key = api_key;
        }
    }
}
