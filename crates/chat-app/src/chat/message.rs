use chrono::{DateTime, Utc};

/// Stable identifier for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a typed message identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Identifier for one user turn.
///
/// Allocated fresh on every submit so terminal transitions can be matched to
/// the turn that started them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

impl TurnId {
    /// Creates a typed turn identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Assistant => "Gemini",
        }
    }
}

/// Lifecycle status for one message.
///
/// Progress and error are one enum so a message can never be both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Streaming,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    /// Creates a message with explicit status, stamped now.
    pub fn new(
        id: MessageId,
        role: Role,
        content: impl Into<String>,
        status: MessageStatus,
    ) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            status,
        }
    }

    /// Creates a finished user message.
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self::new(id, Role::User, content, MessageStatus::Done)
    }

    /// Creates an empty assistant placeholder while streaming.
    pub fn assistant_placeholder(id: MessageId) -> Self {
        Self::new(id, Role::Assistant, String::new(), MessageStatus::Streaming)
    }

    pub fn in_progress(&self) -> bool {
        self.status == MessageStatus::Streaming
    }

    pub fn is_error(&self) -> bool {
        self.status == MessageStatus::Error
    }
}

/// Per-turn stream state owned by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Submitted(TurnId),
    Streaming(TurnId),
    Completed(TurnId),
    Failed {
        turn: TurnId,
        reason: String,
    },
}

/// State transition input for the turn lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnTransition {
    Submit(TurnId),
    BeginStream(TurnId),
    Complete(TurnId),
    Fail { turn: TurnId, reason: String },
    Reset,
}

/// Rejection reason for illegal turn transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnTransitionRejection {
    AlreadyInFlight { active: TurnId, attempted: TurnId },
    NoActiveTurn,
    NotStreaming { attempted: TurnId },
    TurnMismatch { active: TurnId, attempted: TurnId },
}

pub type TurnTransitionResult = Result<TurnState, TurnTransitionRejection>;

impl TurnState {
    /// Returns the in-flight turn while submitted or streaming.
    pub fn active_turn(&self) -> Option<TurnId> {
        match self {
            Self::Submitted(turn) | Self::Streaming(turn) => Some(*turn),
            Self::Idle | Self::Completed(_) | Self::Failed { .. } => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.active_turn().is_some()
    }

    /// Applies one transition deterministically.
    ///
    /// Terminal states accept a new `Submit`. `Fail` is accepted from both
    /// `Submitted` and `Streaming` since opening the stream can fail too.
    pub fn apply(&self, transition: TurnTransition) -> TurnTransitionResult {
        match transition {
            TurnTransition::Submit(turn) => self.apply_submit(turn),
            TurnTransition::BeginStream(turn) => self.apply_begin_stream(turn),
            TurnTransition::Complete(turn) => self.apply_complete(turn),
            TurnTransition::Fail { turn, reason } => self.apply_fail(turn, reason),
            TurnTransition::Reset => Ok(Self::Idle),
        }
    }

    fn apply_submit(&self, turn: TurnId) -> TurnTransitionResult {
        match self.active_turn() {
            Some(active) => Err(TurnTransitionRejection::AlreadyInFlight {
                active,
                attempted: turn,
            }),
            None => Ok(Self::Submitted(turn)),
        }
    }

    fn apply_begin_stream(&self, turn: TurnId) -> TurnTransitionResult {
        match self {
            Self::Submitted(active) if *active == turn => Ok(Self::Streaming(turn)),
            Self::Streaming(active) if *active == turn => {
                Err(TurnTransitionRejection::AlreadyInFlight {
                    active: *active,
                    attempted: turn,
                })
            }
            Self::Submitted(active) | Self::Streaming(active) => {
                Err(TurnTransitionRejection::TurnMismatch {
                    active: *active,
                    attempted: turn,
                })
            }
            Self::Idle | Self::Completed(_) | Self::Failed { .. } => {
                Err(TurnTransitionRejection::NoActiveTurn)
            }
        }
    }

    fn apply_complete(&self, turn: TurnId) -> TurnTransitionResult {
        match self {
            Self::Streaming(active) if *active == turn => Ok(Self::Completed(turn)),
            Self::Submitted(active) if *active == turn => {
                Err(TurnTransitionRejection::NotStreaming { attempted: turn })
            }
            Self::Submitted(active) | Self::Streaming(active) => {
                Err(TurnTransitionRejection::TurnMismatch {
                    active: *active,
                    attempted: turn,
                })
            }
            Self::Idle | Self::Completed(_) | Self::Failed { .. } => {
                Err(TurnTransitionRejection::NoActiveTurn)
            }
        }
    }

    fn apply_fail(&self, turn: TurnId, reason: String) -> TurnTransitionResult {
        match self {
            Self::Submitted(active) | Self::Streaming(active) if *active == turn => {
                Ok(Self::Failed { turn, reason })
            }
            Self::Submitted(active) | Self::Streaming(active) => {
                Err(TurnTransitionRejection::TurnMismatch {
                    active: *active,
                    attempted: turn,
                })
            }
            Self::Idle | Self::Completed(_) | Self::Failed { .. } => {
                Err(TurnTransitionRejection::NoActiveTurn)
            }
        }
    }
}
