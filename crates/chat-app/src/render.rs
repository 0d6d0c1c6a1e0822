use std::path::PathBuf;
use std::sync::Arc;

use murmur_chat::chat::{
    CommandSink, Message, MessageRecord, MessageStatus, Notice, Notifier, PendingAttachments,
    SessionCommand, format_file_size,
};
use murmur_chat::settings::SessionSettings;

pub const TYPING_INDICATOR: &str = "assistant is typing...";

pub fn render_message(message: &Message) -> String {
    let speaker = match &message.status {
        MessageStatus::Failed(_) => format!("{} (error)", message.role.as_str()),
        _ => message.role.as_str().to_string(),
    };

    let mut rendered = format!("{speaker}: {}", message.content);
    if !message.attachments.is_empty() {
        rendered.push_str(&format!("\n  [attached: {}]", message.attachments.join(", ")));
    }
    rendered
}

pub fn render_pending(pending: &PendingAttachments) -> String {
    if pending.is_empty() {
        return "no files queued".to_string();
    }

    pending
        .iter()
        .enumerate()
        .map(|(index, attachment)| {
            format!(
                "{}. {} ({}, {})",
                index + 1,
                attachment.name,
                attachment.display_size(),
                attachment.mime_type
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prints log entries as they become final.
///
/// Resolution happens in place, so rendering stops at a composing placeholder and
/// picks up from the same position once it has been replaced.
#[derive(Debug, Default)]
pub struct Transcript {
    rendered: usize,
    typing_shown: bool,
}

impl Transcript {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn pending_lines(&mut self, messages: &[Message]) -> Vec<String> {
        let mut lines = Vec::new();

        for message in messages.iter().skip(self.rendered) {
            if message.is_composing() {
                if !self.typing_shown {
                    lines.push(TYPING_INDICATOR.to_string());
                    self.typing_shown = true;
                }
                break;
            }
            lines.push(render_message(message));
            self.rendered += 1;
            self.typing_shown = false;
        }

        lines
    }
}

/// Toasts become `!`-prefixed lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: Notice) {
        println!("! {}", describe_notice(&notice));
    }
}

pub fn describe_notice(notice: &Notice) -> String {
    match notice {
        Notice::FilesAccepted { count } => format!("{count} file(s) uploaded successfully"),
        Notice::AttachmentRejected(rejection) => rejection.to_string(),
        Notice::TextOverLimit { length, limit } => {
            format!("message is {length} characters, over the {limit} character limit")
        }
    }
}

pub struct TerminalCommands {
    settings: Arc<SessionSettings>,
    settings_path: PathBuf,
}

impl TerminalCommands {
    pub fn new(settings: Arc<SessionSettings>, settings_path: PathBuf) -> Self {
        Self {
            settings,
            settings_path,
        }
    }
}

impl CommandSink for TerminalCommands {
    fn dispatch(&self, command: SessionCommand, messages: &[Message]) {
        match command {
            SessionCommand::NewChat => println!("--- new conversation ---"),
            SessionCommand::OpenHistory => println!("no saved conversations"),
            SessionCommand::ClearChats => println!("no saved conversations to clear"),
            SessionCommand::OpenSettings => {
                println!("settings file: {}", self.settings_path.display());
                match serde_json::to_string_pretty(self.settings.as_ref()) {
                    Ok(json) => println!("{json}"),
                    Err(error) => tracing::error!(error = %error, "failed to render settings"),
                }
            }
            SessionCommand::ExportChat => {
                let records = messages
                    .iter()
                    .filter(|message| !message.is_composing())
                    .map(Message::to_record)
                    .collect::<Vec<MessageRecord>>();
                match serde_json::to_string_pretty(&records) {
                    Ok(json) => println!("{json}"),
                    Err(error) => tracing::error!(error = %error, "failed to export conversation"),
                }
            }
        }
    }
}

pub fn describe_size_limit(limit: u64) -> String {
    format!("files up to {} are accepted", format_file_size(limit))
}
