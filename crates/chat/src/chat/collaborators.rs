use crate::chat::events::{Notice, SessionCommand};
use crate::chat::message::Message;

/// Receives user-facing feedback (toasts, banners).
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Handles sidebar commands. Gets the current log so export can work from it.
pub trait CommandSink: Send + Sync {
    fn dispatch(&self, command: SessionCommand, messages: &[Message]);
}

/// Default notifier: feedback goes to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::FilesAccepted { count } => {
                tracing::info!(count, "{count} file(s) uploaded successfully");
            }
            Notice::AttachmentRejected(rejection) => {
                tracing::warn!(file = %rejection.name, "{rejection}");
            }
            Notice::TextOverLimit { length, limit } => {
                tracing::warn!(length, limit, "message exceeds the soft length limit");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogCommandSink;

impl CommandSink for LogCommandSink {
    fn dispatch(&self, command: SessionCommand, messages: &[Message]) {
        tracing::info!(
            command = ?command,
            message_count = messages.len(),
            "session command has no handler"
        );
    }
}
