use std::collections::HashSet;
use std::io::Write;

use chrono::Local;
use crossterm::style::{Color, Stylize};

use crate::chat::events::{StoreChange, StoreObserver};
use crate::chat::message::{Message, MessageId, Role};
use crate::chat::store::ChatState;

pub const EMPTY_STATE_TITLE: &str = "How can I help you today?";
pub const EMPTY_STATE_HINT: &str =
    "Ask me anything about general knowledge, coding, creative writing, or analysis.";
const STREAMING_CURSOR: &str = "▍";
const ERROR_MARKER: &str = "!";
const TIMESTAMP_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub color: bool,
    pub timestamps: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            color: true,
            timestamps: true,
        }
    }
}

impl RenderOptions {
    pub fn plain() -> Self {
        Self {
            color: false,
            timestamps: false,
        }
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.color {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.color {
            text.dim().to_string()
        } else {
            text.to_string()
        }
    }
}

/// Renders the whole conversation as text. Pure function of `state`.
pub fn render_transcript(state: &ChatState, options: RenderOptions) -> String {
    if state.messages.is_empty() {
        return render_empty_state(options, None);
    }

    let mut output = String::new();
    for message in &state.messages {
        output.push_str(&render_header(message, options));
        output.push('\n');

        if message.is_error() {
            output.push_str(&options.paint(&message.content, Color::Red));
        } else {
            output.push_str(&message.content);
        }

        if message.in_progress() {
            output.push_str(&options.paint(STREAMING_CURSOR, Color::Green));
        }
        output.push_str("\n\n");
    }

    output
}

/// Greeting shown while the conversation is empty, naming the model when known.
pub fn render_empty_state(options: RenderOptions, model_name: Option<&str>) -> String {
    let hint = match model_name {
        Some(name) => format!("{EMPTY_STATE_HINT} I'm powered by the {name} model."),
        None => EMPTY_STATE_HINT.to_string(),
    };
    format!(
        "{}\n{}\n",
        options.paint(EMPTY_STATE_TITLE, Color::Cyan),
        options.dim(&hint)
    )
}

pub fn disclaimer(model_name: &str) -> String {
    format!("{model_name} can make mistakes. Please check important information.")
}

fn render_header(message: &Message, options: RenderOptions) -> String {
    let label = match (message.role, message.is_error()) {
        (Role::User, _) => options.paint(message.role.label(), Color::Blue),
        (Role::Assistant, false) => options.paint(message.role.label(), Color::Green),
        (Role::Assistant, true) => options.paint(
            &format!("{ERROR_MARKER} {}", message.role.label()),
            Color::Red,
        ),
    };

    if options.timestamps {
        let time = message
            .timestamp
            .with_timezone(&Local)
            .format(TIMESTAMP_FORMAT)
            .to_string();
        format!("{label} {}", options.dim(&time))
    } else {
        label
    }
}

/// Incremental renderer for a terminal.
///
/// User messages are not echoed since the terminal already shows what was
/// typed. A failed reply cannot be erased from the screen, so the notice is
/// printed below whatever fragments had already arrived.
pub struct TerminalRenderer<W> {
    out: W,
    options: RenderOptions,
    model_name: Option<String>,
    partially_written: HashSet<MessageId>,
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W, options: RenderOptions) -> Self {
        Self {
            out,
            options,
            model_name: None,
            partially_written: HashSet::new(),
        }
    }

    /// Names the model in the greeting printed after a clear.
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        if let Err(error) = self
            .out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush())
        {
            tracing::warn!(%error, "failed to write to terminal");
        }
    }
}

impl<W: Write + Send> StoreObserver for TerminalRenderer<W> {
    fn on_change(&mut self, change: &StoreChange, state: &ChatState) {
        match change {
            StoreChange::MessageAppended(id) => {
                let Some(message) = state.message(*id) else {
                    return;
                };
                if message.role == Role::Assistant {
                    let header = render_header(message, self.options);
                    self.write(&format!("\n{header}\n"));
                }
            }
            StoreChange::ContentAppended { id, fragment } => {
                self.partially_written.insert(*id);
                self.write(fragment);
            }
            StoreChange::MessageFinalized(id) => {
                self.partially_written.remove(id);
                self.write("\n\n");
            }
            StoreChange::MessageFailed(id) => {
                let Some(message) = state.message(*id) else {
                    return;
                };
                let prefix = if self.partially_written.remove(id) {
                    "\n"
                } else {
                    ""
                };
                let notice = self
                    .options
                    .paint(&format!("{ERROR_MARKER} {}", message.content), Color::Red);
                self.write(&format!("{prefix}{notice}\n\n"));
            }
            StoreChange::LoadingChanged(_) => {}
            StoreChange::Cleared => {
                self.partially_written.clear();
                let greeting = render_empty_state(self.options, self.model_name.as_deref());
                self.write(&format!("\n{greeting}\n"));
            }
        }
    }
}
