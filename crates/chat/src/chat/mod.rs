pub mod attachment;
pub mod collaborators;
/// Event contracts between the host and the engine.
pub mod events;
pub mod input;
/// Domain entities and the reply lifecycle state machine.
pub mod message;
pub mod scroll_manager;
pub mod session;
pub mod store;

pub use attachment::{
    Attachment, AttachmentId, AttachmentIntake, ContentHandle, FileCandidate, IntakeReport,
    MAX_ATTACHMENT_BYTES, PendingAttachments, Rejection, RejectionReason, describe_attachments,
    format_file_size,
};
pub use collaborators::{CommandSink, LogCommandSink, LogNotifier, Notifier};
pub use events::{
    Notice, ReplyApplied, ReplyRejection, SendIntent, SessionCommand, SubmitOutcome,
    SubmitRejection,
};
pub use input::{Draft, SOFT_TEXT_LIMIT};
pub use message::{
    Message, MessageId, MessageRecord, MessageStatus, Role, SessionState, SessionTransition,
    TransitionRejection, TransitionResult,
};
pub use scroll_manager::{DETACH_THRESHOLD, ScrollCommand, ScrollMetrics, ScrollTracker};
pub use session::{SessionEngine, SessionView};
pub use store::{MessageStore, StoreError, StoreResult};
