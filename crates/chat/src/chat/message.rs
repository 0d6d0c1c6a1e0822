use std::time::{SystemTime, UNIX_EPOCH};

use murmur_llm::{ReplyTarget, RequestId};
use serde::Serialize;

/// Stable identifier for one message, monotonic within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a typed message identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Lifecycle status for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStatus {
    Done,
    /// Transient "assistant is typing" placeholder for the given request.
    Composing(RequestId),
    /// Assistant-authored notice that generation failed.
    Failed(String),
}

/// Conversation entry. Immutable once appended; a composing placeholder is replaced,
/// never edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    /// Markdown for assistant messages, plain text for user messages.
    pub content: String,
    pub timestamp: SystemTime,
    pub status: MessageStatus,
    /// Names of files that were folded into this message on send.
    pub attachments: Vec<String>,
}

impl Message {
    /// Creates a message stamped with the current time.
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
            timestamp: SystemTime::now(),
            status,
            attachments: Vec::new(),
        }
    }

    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self::new(id, Role::User, content, MessageStatus::Done)
    }

    pub fn assistant(id: MessageId, content: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, content, MessageStatus::Done)
    }

    /// Creates the empty assistant placeholder shown while a reply is pending.
    pub fn composing(id: MessageId, request_id: RequestId) -> Self {
        Self::new(
            id,
            Role::Assistant,
            String::new(),
            MessageStatus::Composing(request_id),
        )
    }

    pub fn generation_failed(id: MessageId, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            id,
            Role::Assistant,
            format!("Sorry, I couldn't generate a response ({reason}). Please try again."),
            MessageStatus::Failed(reason),
        )
    }

    pub fn with_attachments(mut self, names: Vec<String>) -> Self {
        self.attachments = names;
        self
    }

    pub fn is_composing(&self) -> bool {
        matches!(self.status, MessageStatus::Composing(_))
    }

    pub fn to_record(&self) -> MessageRecord {
        MessageRecord {
            id: self.id.0,
            role: self.role.as_str(),
            content: self.content.clone(),
            timestamp_unix_ms: self
                .timestamp
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis() as u64)
                .unwrap_or(0),
            failed: matches!(self.status, MessageStatus::Failed(_)),
            attachments: self.attachments.clone(),
        }
    }
}

/// Serializable view of a finalized message, handed to export collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub id: u64,
    pub role: &'static str,
    pub content: String,
    pub timestamp_unix_ms: u64,
    pub failed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

/// Session lifecycle boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingReply(ReplyTarget),
}

/// State transition input for the reply lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    Submit(ReplyTarget),
    ReplyArrived(ReplyTarget),
    GenerationFailed(ReplyTarget),
}

/// Rejection reason for illegal transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRejection {
    AlreadyAwaiting {
        active: ReplyTarget,
        attempted: ReplyTarget,
    },
    NoOutstandingRequest,
    RequestMismatch {
        active: ReplyTarget,
        attempted: ReplyTarget,
    },
}

pub type TransitionResult = Result<SessionState, TransitionRejection>;

impl SessionState {
    /// Returns the outstanding request if and only if state is `AwaitingReply`.
    pub fn outstanding(&self) -> Option<ReplyTarget> {
        match self {
            Self::AwaitingReply(target) => Some(*target),
            Self::Idle => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::AwaitingReply(_))
    }

    /// Applies one transition deterministically.
    ///
    /// Only `Idle` may start a request; both terminal transitions must match the
    /// outstanding request exactly.
    pub fn apply(&self, transition: SessionTransition) -> TransitionResult {
        match transition {
            SessionTransition::Submit(target) => match self {
                Self::Idle => Ok(Self::AwaitingReply(target)),
                Self::AwaitingReply(active) => Err(TransitionRejection::AlreadyAwaiting {
                    active: *active,
                    attempted: target,
                }),
            },
            SessionTransition::ReplyArrived(target)
            | SessionTransition::GenerationFailed(target) => self.apply_terminal(target),
        }
    }

    fn apply_terminal(&self, target: ReplyTarget) -> TransitionResult {
        match self {
            Self::AwaitingReply(active) if *active == target => Ok(Self::Idle),
            Self::AwaitingReply(active) => Err(TransitionRejection::RequestMismatch {
                active: *active,
                attempted: target,
            }),
            Self::Idle => Err(TransitionRejection::NoOutstandingRequest),
        }
    }
}
