use murmur_llm::ReplyTarget;

use crate::chat::attachment::{Attachment, Rejection};
use crate::chat::message::MessageId;

/// Emitted when the user sends the composed text and pending files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendIntent {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl SendIntent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// True when there is nothing to send: blank text and no files.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }
}

/// Sidebar-level actions, routed to a collaborator rather than handled in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionCommand {
    NewChat,
    OpenHistory,
    OpenSettings,
    ExportChat,
    ClearChats,
}

/// User-visible feedback emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    FilesAccepted { count: usize },
    AttachmentRejected(Rejection),
    TextOverLimit { length: usize, limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted {
        target: ReplyTarget,
        user_message_id: MessageId,
        placeholder_id: MessageId,
    },
    /// Nothing to send; silently dropped.
    Ignored,
    Rejected(SubmitRejection),
}

/// Guard violations on submit. Logged, never shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    Busy { active: ReplyTarget },
    PlaceholderPresent { existing: MessageId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyApplied {
    Replied { message_id: MessageId },
    Failed { message_id: MessageId },
}

/// Guard violations on reply delivery. The log is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyRejection {
    NoOutstandingRequest,
    Stale {
        active: ReplyTarget,
        attempted: ReplyTarget,
    },
    MissingPlaceholder,
}
