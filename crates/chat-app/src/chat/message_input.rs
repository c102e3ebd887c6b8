/// Trailing marker that turns Enter into a line break instead of a submit.
pub const LINE_CONTINUATION: char = '\\';
pub const PROMPT: &str = "› ";
pub const CONTINUATION_PROMPT: &str = "… ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    History,
    Help,
    Quit,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "reset" | "clear" => Some(Self::Reset),
            "history" => Some(Self::History),
            "help" => Some(Self::Help),
            "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

pub const HELP_TEXT: &str = "\
Enter sends the message. End a line with \\ to continue on the next line.
Commands:
  /reset    clear the conversation (alias /clear)
  /history  print the whole conversation
  /help     show this help
  /quit     leave (alias /exit)";

/// Result of feeding one terminal line into the input box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Submit(String),
    Continue,
    Command(Command),
    UnknownCommand(String),
}

/// Line-oriented message composer.
///
/// Buffers continued lines until a line without the continuation marker
/// arrives. Commands are only recognised on the first line of a message.
#[derive(Debug, Default)]
pub struct MessageInput {
    buffer: String,
    pending_newline: bool,
}

impl MessageInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a continued message is being composed.
    pub fn is_composing(&self) -> bool {
        self.pending_newline
    }

    pub fn prompt(&self) -> &'static str {
        if self.pending_newline {
            CONTINUATION_PROMPT
        } else {
            PROMPT
        }
    }

    pub fn push_line(&mut self, line: &str) -> InputAction {
        let line = trim_trailing_newline(line);

        if !self.pending_newline
            && let Some(name) = line.trim().strip_prefix('/')
        {
            let name = name.trim();
            return match Command::parse(name) {
                Some(command) => InputAction::Command(command),
                None => InputAction::UnknownCommand(name.to_string()),
            };
        }

        if self.pending_newline {
            self.buffer.push('\n');
        }

        if let Some(head) = line.strip_suffix(LINE_CONTINUATION) {
            self.buffer.push_str(head);
            self.pending_newline = true;
            return InputAction::Continue;
        }

        self.buffer.push_str(line);
        self.pending_newline = false;
        InputAction::Submit(std::mem::take(&mut self.buffer))
    }

    /// Drops a half-composed message.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending_newline = false;
    }
}

fn trim_trailing_newline(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .unwrap_or(line)
}
