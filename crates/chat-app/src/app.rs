use std::path::Path;
use std::sync::Arc;

use murmur_chat::chat::{
    ContentHandle, Draft, FileCandidate, ScrollCommand, SessionCommand, SessionEngine,
    SubmitOutcome, SubmitRejection,
};
use murmur_chat::settings::{SETTING_FIELDS, SessionSettings, SettingsError, SettingsStore};
use murmur_llm::{BackendError, create_backend};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::{HELP, HostCommand};
use crate::render::{
    TerminalCommands, TerminalNotifier, Transcript, describe_size_limit, render_pending,
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("failed to start a chat session on `{stage}`: {source}"))]
    StartSession {
        stage: &'static str,
        source: BackendError,
    },
    #[snafu(display("failed to read from stdin on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Line-oriented host around one [`SessionEngine`].
pub struct TerminalApp {
    settings_store: SettingsStore,
    engine: SessionEngine,
    draft: Draft,
    transcript: Transcript,
}

impl TerminalApp {
    pub fn new(settings_store: SettingsStore) -> AppResult<Self> {
        let settings = settings_store.settings();
        let engine = start_session(&settings_store, &settings)?;
        let draft = Draft::new(engine.soft_text_limit());

        Ok(Self {
            settings_store,
            engine,
            draft,
            transcript: Transcript::default(),
        })
    }

    pub async fn run(mut self) -> AppResult<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("type a message, or /help for commands");
        self.render();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = line.context(ReadInputSnafu { stage: "read-stdin-line" })?;
                    let Some(line) = line else {
                        tracing::debug!("stdin closed");
                        break;
                    };
                    if self.handle_line(&line).await? == Flow::Quit {
                        break;
                    }
                }
                Some(event) = self.engine.wait_for_reply(), if self.engine.is_busy() => {
                    if let Err(rejection) = self.engine.apply_reply(event) {
                        tracing::warn!(rejection = ?rejection, "reply was not applied");
                    }
                }
            }
            self.render();
        }

        self.engine.shutdown();
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> AppResult<Flow> {
        if self.draft.text().is_empty()
            && let Some(command) = HostCommand::parse(line)
        {
            return match command {
                Ok(command) => self.handle_command(command).await,
                Err(error) => {
                    println!("{error}");
                    Ok(Flow::Continue)
                }
            };
        }

        // A trailing backslash continues the message on the next line.
        if let Some(partial) = line.strip_suffix('\\') {
            self.draft.push_str(partial);
            self.draft.insert_newline();
            println!("... {}", self.draft.counter_label());
            return Ok(Flow::Continue);
        }
        self.draft.push_str(line);

        let busy = self.engine.is_busy();
        let attachments = self.engine.pending_attachments().to_vec();
        let Some(intent) = self.draft.take_intent(attachments, busy) else {
            if busy {
                println!("still waiting for the previous reply; message not sent");
            }
            self.draft.clear();
            return Ok(Flow::Continue);
        };

        match self.engine.submit(intent) {
            SubmitOutcome::Accepted { .. } | SubmitOutcome::Ignored => {}
            SubmitOutcome::Rejected(SubmitRejection::Busy { .. }) => {
                println!("still waiting for the previous reply; message not sent");
            }
            SubmitOutcome::Rejected(rejection) => {
                tracing::error!(rejection = ?rejection, "submit refused");
            }
        }
        Ok(Flow::Continue)
    }

    async fn handle_command(&mut self, command: HostCommand) -> AppResult<Flow> {
        match command {
            HostCommand::Attach(path) => self.attach(&path).await,
            HostCommand::Remove(position) => {
                let id = self
                    .engine
                    .pending_attachments()
                    .iter()
                    .nth(position - 1)
                    .map(|attachment| attachment.id);
                match id.and_then(|id| self.engine.remove_attachment(id)) {
                    Some(removed) => println!("removed {}", removed.name),
                    None => println!("no queued file number {position}"),
                }
            }
            HostCommand::RemoveAll => {
                let dropped = self.engine.clear_attachments();
                println!("removed {dropped} queued file(s)");
            }
            HostCommand::Files => {
                println!(
                    "{}",
                    describe_size_limit(self.engine.max_attachment_bytes())
                );
                println!("{}", render_pending(self.engine.pending_attachments()));
            }
            HostCommand::Scroll(metrics) => {
                if self.engine.observe_scroll(metrics) {
                    println!("scrolled away from the latest message; /jump to return");
                }
            }
            HostCommand::Jump => self.engine.jump_to_latest(),
            HostCommand::New => self.restart()?,
            HostCommand::History => self.engine.dispatch(SessionCommand::OpenHistory),
            HostCommand::Settings => self.engine.dispatch(SessionCommand::OpenSettings),
            HostCommand::Set { field, value } => {
                match apply_setting(&self.settings_store, &field, &value) {
                    Ok(()) => println!("saved {field}; /new starts a conversation with it"),
                    Err(error @ SettingsError::UnknownField { .. }) => {
                        println!("{error}; known settings: {}", SETTING_FIELDS.join(", "));
                    }
                    Err(error) => println!("{error}"),
                }
            }
            HostCommand::Export => self.engine.dispatch(SessionCommand::ExportChat),
            HostCommand::Clear => self.engine.dispatch(SessionCommand::ClearChats),
            HostCommand::Help => println!("{HELP}"),
            HostCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    async fn attach(&mut self, path: &Path) {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => {
                println!("{} is not a file", path.display());
                return;
            }
            Err(error) => {
                println!("cannot read {}: {error}", path.display());
                return;
            }
        };

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let candidate =
            FileCandidate::new(name, metadata.len(), ContentHandle::Path(path.to_path_buf()));

        let report = self.engine.attach_files([candidate]);
        for attachment in &report.accepted {
            println!(
                "queued {} ({})",
                attachment.name,
                attachment.display_size()
            );
        }
    }

    fn restart(&mut self) -> AppResult<()> {
        self.engine.dispatch(SessionCommand::NewChat);
        self.engine.shutdown();

        let settings = self.settings_store.settings();
        self.engine = start_session(&self.settings_store, &settings)?;
        self.draft = Draft::new(self.engine.soft_text_limit());
        self.transcript.reset();
        Ok(())
    }

    fn render(&mut self) {
        for line in self.transcript.pending_lines(self.engine.messages()) {
            println!("{line}");
        }

        if let Some(ScrollCommand::ScrollToTail) = self.engine.take_scroll_command() {
            tracing::trace!("viewport follows the latest message");
        }
    }
}

/// Changes one field of the stored settings and saves the result.
fn apply_setting(
    settings_store: &SettingsStore,
    field: &str,
    value: &str,
) -> Result<(), SettingsError> {
    let mut settings = SessionSettings::clone(&settings_store.settings());
    settings.set_field(field, value)?;
    settings_store.update(settings)
}

fn start_session(
    settings_store: &SettingsStore,
    settings: &Arc<SessionSettings>,
) -> AppResult<SessionEngine> {
    let backend = create_backend(settings.backend_config()).context(StartSessionSnafu {
        stage: "create-reply-backend",
    })?;

    Ok(SessionEngine::with_collaborators(
        backend,
        settings,
        Arc::new(TerminalNotifier),
        Arc::new(TerminalCommands::new(
            settings.clone(),
            settings_store.config_path().to_path_buf(),
        )),
    ))
}
