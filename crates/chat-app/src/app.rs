use std::io::{IsTerminal, Write};
use std::path::Path;

use assistant_llm::{ChatClient, create_provider, resolve_model};
use crossterm::style::Stylize;
use snafu::ResultExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::chat::message_input::HELP_TEXT;
use crate::chat::render::{disclaimer, render_empty_state};
use crate::chat::{
    Command, ConversationController, InputAction, MessageInput, RenderOptions, TerminalRenderer,
    TurnOutcome, render_transcript,
};
use crate::cli::{Cli, Commands, ConfigAction, SettingsChanges};
use crate::error::{
    AppResult, CreateProviderSnafu, ReadInputSnafu, SettingsSnafu, WriteOutputSnafu,
};
use crate::settings::{ProviderSettings, SettingsStore};

pub const APP_TITLE: &str = "Gemini Assistant";
pub const RESET_CONFIRMATION: &str = "Are you sure you want to clear the conversation? [y/N] ";
const MISSING_KEY_NOTICE: &str =
    "No API key configured. Set GEMINI_API_KEY or run `assistant config set --api-key <KEY>`.";

/// Dispatches a parsed command line.
pub async fn run(cli: Cli) -> AppResult<()> {
    let Cli {
        config,
        model,
        no_color,
        command,
    } = cli;
    let store = match config {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };
    let mut stdout = std::io::stdout();

    match command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(&store, model, no_color).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => show_config(&store.settings(), store.config_path(), &mut stdout),
        Commands::Config {
            action: ConfigAction::Set { changes },
        } => set_config(&store, changes, &mut stdout),
    }
}

async fn run_chat(store: &SettingsStore, model: Option<String>, no_color: bool) -> AppResult<()> {
    let mut settings = ProviderSettings::clone(&store.settings());
    if let Some(model) = model {
        settings.model = model;
        settings = settings.normalized();
    }

    let provider = create_provider(settings.to_provider_config()).context(CreateProviderSnafu {
        stage: "create-provider",
    })?;
    let client = ChatClient::new(provider, settings.to_session_options());
    let mut controller = ConversationController::new(client);
    controller.start();

    let options = RenderOptions {
        color: settings.color && !no_color && std::io::stdout().is_terminal(),
        timestamps: true,
    };
    let renderer = TerminalRenderer::new(std::io::stdout(), options)
        .with_model_name(settings.selected_model().name);
    controller.subscribe(Box::new(renderer));

    let mut shell = AssistantShell::new(
        controller,
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
        options,
    );
    if !settings.has_api_key() {
        tracing::warn!("no api key configured, requests will fail until one is set");
        shell.notice(MISSING_KEY_NOTICE)?;
    }
    shell.run().await
}

fn show_config(settings: &ProviderSettings, path: &Path, out: &mut impl Write) -> AppResult<()> {
    let model = settings.selected_model();
    let endpoint = if settings.endpoint.is_empty() {
        "(default)"
    } else {
        settings.endpoint.as_str()
    };
    let temperature = settings
        .temperature
        .map(|value| value.to_string())
        .unwrap_or_else(|| "(default)".to_string());
    let max_tokens = settings
        .max_tokens
        .map(|value| value.to_string())
        .unwrap_or_else(|| "(default)".to_string());

    writeln!(
        out,
        "settings file:      {}\n\
         provider:           {}\n\
         model:              {} ({})\n\
         endpoint:           {endpoint}\n\
         api key:            {}\n\
         temperature:        {temperature}\n\
         max tokens:         {max_tokens}\n\
         color:              {}\n\
         system instruction: {}",
        path.display(),
        settings.provider_id,
        model.id,
        model.name,
        settings.masked_api_key(),
        settings.color,
        settings.system_instruction,
    )
    .context(WriteOutputSnafu {
        stage: "show-config",
    })
}

fn set_config(
    store: &SettingsStore,
    changes: SettingsChanges,
    out: &mut impl Write,
) -> AppResult<()> {
    if changes.is_empty() {
        return writeln!(out, "Nothing to change. See `assistant config set --help`.").context(
            WriteOutputSnafu {
                stage: "set-config",
            },
        );
    }

    store
        .update_file(|settings| changes.apply(settings))
        .context(SettingsSnafu {
            stage: "set-config",
        })?;
    writeln!(out, "Saved {}", store.config_path().display()).context(WriteOutputSnafu {
        stage: "set-config",
    })?;
    show_config(&store.settings(), store.config_path(), out)
}

/// Interactive read-submit loop around a [`ConversationController`].
///
/// Input is read only between turns, so a new message cannot be submitted
/// while a reply is still streaming.
pub struct AssistantShell<R, W> {
    controller: ConversationController,
    input: MessageInput,
    reader: R,
    out: W,
    options: RenderOptions,
}

impl<R, W> AssistantShell<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(
        controller: ConversationController,
        reader: R,
        out: W,
        options: RenderOptions,
    ) -> Self {
        Self {
            controller,
            input: MessageInput::new(),
            reader,
            out,
            options,
        }
    }

    pub fn controller(&self) -> &ConversationController {
        &self.controller
    }

    pub fn into_inner(self) -> (ConversationController, W) {
        (self.controller, self.out)
    }

    /// Runs until `/quit` or end of input.
    pub async fn run(&mut self) -> AppResult<()> {
        self.write_banner()?;

        while let Some(line) = self.read_line(self.input.prompt()).await? {
            match self.input.push_line(&line) {
                InputAction::Continue => {}
                InputAction::Submit(text) => self.submit(&text).await?,
                InputAction::Command(Command::Quit) => break,
                InputAction::Command(command) => self.run_command(command).await?,
                InputAction::UnknownCommand(name) => {
                    self.write(&format!("Unknown command /{name}. Type /help for commands.\n"))?;
                }
            }
        }

        if self.input.is_composing() {
            self.input.clear();
            self.write("\nDiscarded the unfinished message.")?;
        }
        self.write("\n")?;
        Ok(())
    }

    pub fn notice(&mut self, text: &str) -> AppResult<()> {
        let text = if self.options.color {
            text.yellow().to_string()
        } else {
            text.to_string()
        };
        self.write(&format!("{text}\n"))
    }

    async fn submit(&mut self, text: &str) -> AppResult<()> {
        match self.controller.submit(text).await {
            TurnOutcome::Busy => {
                self.write("Still answering the previous message.\n")?;
            }
            TurnOutcome::Failed { reason, .. } => {
                tracing::debug!(%reason, "reply replaced by the error notice");
            }
            TurnOutcome::Ignored | TurnOutcome::Completed { .. } => {}
        }
        Ok(())
    }

    async fn run_command(&mut self, command: Command) -> AppResult<()> {
        match command {
            Command::Reset => self.confirm_reset().await,
            Command::History => {
                let transcript = render_transcript(self.controller.store().state(), self.options);
                self.write(&format!("\n{transcript}"))
            }
            Command::Help => self.write(&format!("{HELP_TEXT}\n")),
            Command::Quit => Ok(()),
        }
    }

    async fn confirm_reset(&mut self) -> AppResult<()> {
        let answer = self.read_line(RESET_CONFIRMATION).await?.unwrap_or_default();
        if matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            self.input.clear();
            self.controller.reset();
            Ok(())
        } else {
            self.write("Kept the conversation.\n")
        }
    }

    fn write_banner(&mut self) -> AppResult<()> {
        let client = self.controller.client();
        let provider = client.provider_name().to_string();
        let model = resolve_model(client.model_id());
        let title = if self.options.color {
            APP_TITLE.bold().to_string()
        } else {
            APP_TITLE.to_string()
        };
        let greeting = render_empty_state(self.options, Some(&model.name));
        let disclaimer = disclaimer(&model.name);
        let disclaimer = if self.options.color {
            disclaimer.as_str().dim().to_string()
        } else {
            disclaimer
        };
        self.write(&format!(
            "{title} ({provider} \u{b7} {})\n\n{greeting}{disclaimer}\nType /help for commands.\n\n",
            model.id
        ))
    }

    async fn read_line(&mut self, prompt: &str) -> AppResult<Option<String>> {
        self.write(prompt)?;
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .await
            .context(ReadInputSnafu { stage: "read-line" })?;
        Ok((read > 0).then_some(line))
    }

    fn write(&mut self, text: &str) -> AppResult<()> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush())
            .context(WriteOutputSnafu {
                stage: "write-terminal",
            })
    }
}
