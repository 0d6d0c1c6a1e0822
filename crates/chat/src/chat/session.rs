use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use murmur_llm::{
    BackendResult, PendingReply, ReplyBackend, ReplyEvent, ReplyOutcome, ReplyRequest,
    ReplyTarget, RequestId, SessionId, create_backend,
};
use tokio::task::JoinHandle;

use crate::chat::attachment::{
    Attachment, AttachmentId, AttachmentIntake, FileCandidate, IntakeReport, PendingAttachments,
    describe_attachments,
};
use crate::chat::collaborators::{CommandSink, LogCommandSink, LogNotifier, Notifier};
use crate::chat::events::{
    Notice, ReplyApplied, ReplyRejection, SendIntent, SessionCommand, SubmitOutcome,
    SubmitRejection,
};
use crate::chat::message::{
    Message, MessageId, SessionState, SessionTransition, TransitionRejection,
};
use crate::chat::scroll_manager::{ScrollCommand, ScrollMetrics, ScrollTracker};
use crate::chat::store::MessageStore;
use crate::settings::SessionSettings;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Engine-level metadata for the one outstanding request.
struct ActiveReply {
    target: ReplyTarget,
    placeholder_id: MessageId,
    sent_attachments: Vec<AttachmentId>,
    reply: PendingReply,
    worker: JoinHandle<()>,
}

impl Drop for ActiveReply {
    fn drop(&mut self) {
        // PendingReply signals cancellation on drop; abort covers workers that ignore it.
        self.worker.abort();
    }
}

/// Read state handed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub messages: Vec<Message>,
    pub busy: bool,
    pub show_jump_to_latest: bool,
}

/// Orchestrates one conversation: message log, reply lifecycle, attachments and
/// scroll follow.
///
/// Every mutation happens on `&mut self` in reaction to one discrete event, so two
/// transitions never interleave. Submitting spawns the backend worker on the ambient
/// Tokio runtime.
pub struct SessionEngine {
    session_id: SessionId,
    store: MessageStore,
    state: SessionState,
    scroll: ScrollTracker,
    intake: AttachmentIntake,
    pending_attachments: PendingAttachments,
    backend: Arc<dyn ReplyBackend>,
    notifier: Arc<dyn Notifier>,
    commands: Arc<dyn CommandSink>,
    soft_text_limit: usize,
    next_message_id: u64,
    next_request_id: u64,
    active_reply: Option<ActiveReply>,
    pending_scroll: Option<ScrollCommand>,
}

impl SessionEngine {
    pub fn new(backend: Arc<dyn ReplyBackend>, settings: &SessionSettings) -> Self {
        Self::with_collaborators(
            backend,
            settings,
            Arc::new(LogNotifier),
            Arc::new(LogCommandSink),
        )
    }

    /// Builds the engine with the backend named in `settings`.
    pub fn from_settings(settings: &SessionSettings) -> BackendResult<Self> {
        let backend = create_backend(settings.backend_config())?;
        Ok(Self::new(backend, settings))
    }

    pub fn with_collaborators(
        backend: Arc<dyn ReplyBackend>,
        settings: &SessionSettings,
        notifier: Arc<dyn Notifier>,
        commands: Arc<dyn CommandSink>,
    ) -> Self {
        let settings = settings.clone().normalized();
        let session_id = SessionId::new(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));

        let mut this = Self {
            session_id,
            store: MessageStore::new(),
            state: SessionState::Idle,
            scroll: ScrollTracker::new(settings.detach_threshold),
            intake: AttachmentIntake::new(settings.max_attachment_bytes),
            pending_attachments: PendingAttachments::new(),
            backend,
            notifier,
            commands,
            soft_text_limit: settings.soft_text_limit,
            next_message_id: 1,
            next_request_id: 1,
            active_reply: None,
            pending_scroll: None,
        };

        if let Some(greeting) = settings.greeting {
            let message_id = this.alloc_message_id();
            if let Err(error) = this.store.append(Message::assistant(message_id, greeting)) {
                tracing::error!(error = %error, "greeting refused by the message store");
            }
        }

        tracing::debug!(
            session_id = ?this.session_id,
            backend = this.backend.id(),
            "session started"
        );
        this
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn soft_text_limit(&self) -> usize {
        self.soft_text_limit
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.store.snapshot()
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            messages: self.store.snapshot(),
            busy: self.is_busy(),
            show_jump_to_latest: self.scroll.is_detached(),
        }
    }

    /// Largest accepted attachment, in bytes.
    pub fn max_attachment_bytes(&self) -> u64 {
        self.intake.max_bytes()
    }

    pub fn pending_attachments(&self) -> &PendingAttachments {
        &self.pending_attachments
    }

    /// Validates files and adds the accepted ones to the pending list. Each rejection
    /// is reported to the notifier.
    pub fn attach_files(&mut self, candidates: impl IntoIterator<Item = FileCandidate>) -> IntakeReport {
        let report = self.intake.intake(candidates);

        for rejection in &report.rejected {
            self.notifier
                .notify(Notice::AttachmentRejected(rejection.clone()));
        }
        self.pending_attachments.extend(report.accepted.iter().cloned());

        report
    }

    pub fn remove_attachment(&mut self, id: AttachmentId) -> Option<Attachment> {
        self.pending_attachments.remove(id)
    }

    /// Drops every queued file. Returns how many were dropped.
    pub fn clear_attachments(&mut self) -> usize {
        let count = self.pending_attachments.len();
        self.pending_attachments.clear();
        count
    }

    /// Sends `text` together with everything in the pending attachment list.
    ///
    /// # Panics
    ///
    /// Same as [`Self::submit`].
    pub fn submit_pending(&mut self, text: impl Into<String>) -> SubmitOutcome {
        let intent = SendIntent::new(text).with_attachments(self.pending_attachments.to_vec());
        self.submit(intent)
    }

    /// Starts a reply for `intent` when idle.
    ///
    /// # Panics
    ///
    /// An accepted submit spawns the backend worker with [`tokio::spawn`], so it panics
    /// when called outside a Tokio runtime. Ignored and rejected intents never spawn.
    pub fn submit(&mut self, intent: SendIntent) -> SubmitOutcome {
        if let Some(active) = self.state.outstanding() {
            tracing::warn!(
                target = ?active,
                "submit rejected while a reply is outstanding"
            );
            return SubmitOutcome::Rejected(SubmitRejection::Busy { active });
        }

        if intent.is_empty() {
            tracing::debug!(session_id = ?self.session_id, "ignoring empty submit");
            return SubmitOutcome::Ignored;
        }

        if let Some(existing) = self.store.composing() {
            tracing::error!(
                message_id = %existing.id,
                "composing placeholder present while idle; refusing submit"
            );
            return SubmitOutcome::Rejected(SubmitRejection::PlaceholderPresent {
                existing: existing.id,
            });
        }

        let target = ReplyTarget::new(self.session_id, self.alloc_request_id());
        match self.state.apply(SessionTransition::Submit(target)) {
            Ok(next_state) => self.state = next_state,
            Err(rejection) => {
                tracing::warn!(rejection = ?rejection, "submit transition refused");
                return SubmitOutcome::Rejected(SubmitRejection::Busy {
                    active: self.state.outstanding().unwrap_or(target),
                });
            }
        }

        let SendIntent { text, attachments } = intent;
        let text = text.trim().to_string();
        let length = text.chars().count();
        if length > self.soft_text_limit {
            self.notifier.notify(Notice::TextOverLimit {
                length,
                limit: self.soft_text_limit,
            });
        }
        if !attachments.is_empty() {
            self.notifier.notify(Notice::FilesAccepted {
                count: attachments.len(),
            });
        }

        let content = if text.is_empty() {
            describe_attachments(attachments.len())
        } else {
            text.clone()
        };
        let attachment_names = attachments
            .iter()
            .map(|attachment| attachment.name.clone())
            .collect::<Vec<_>>();

        let user_message_id = self.alloc_message_id();
        if let Err(error) = self
            .store
            .append(Message::user(user_message_id, content).with_attachments(attachment_names))
        {
            tracing::error!(error = %error, "user message refused by the message store");
        }
        self.follow_tail();

        let placeholder_id = self.alloc_message_id();
        if let Err(error) = self
            .store
            .append_composing_placeholder(Message::composing(placeholder_id, target.request_id))
        {
            tracing::error!(error = %error, "composing placeholder refused after guard passed");
        }
        self.follow_tail();

        tracing::info!(
            target = ?target,
            message_id = %user_message_id,
            attachment_count = attachments.len(),
            "submit accepted"
        );

        let sent_attachments = attachments
            .iter()
            .map(|attachment| attachment.id)
            .collect::<Vec<_>>();
        match self.backend.request(ReplyRequest::new(target, text)) {
            Ok(handle) => {
                self.active_reply = Some(ActiveReply {
                    target,
                    placeholder_id,
                    sent_attachments,
                    reply: handle.reply,
                    worker: tokio::spawn(handle.worker),
                });
            }
            Err(error) => {
                tracing::warn!(target = ?target, error = %error, "reply request failed");
                if self
                    .apply_reply(ReplyEvent::failed(target, error.to_string()))
                    .is_ok()
                {
                    self.release_attachments(&sent_attachments);
                }
            }
        }

        SubmitOutcome::Accepted {
            target,
            user_message_id,
            placeholder_id,
        }
    }

    /// Waits for the outstanding reply. Returns `None` only when nothing is outstanding.
    ///
    /// A worker that goes away without answering is reported as a generation failure
    /// so the session never hangs in `AwaitingReply`.
    pub async fn wait_for_reply(&mut self) -> Option<ReplyEvent> {
        let active = self.active_reply.as_mut()?;
        let target = active.target;

        match active.reply.recv().await {
            Some(event) => Some(event),
            None => {
                tracing::warn!(target = ?target, "reply backend closed without answering");
                Some(ReplyEvent::failed(
                    target,
                    "the reply backend stopped without answering",
                ))
            }
        }
    }

    /// Resolves the composing placeholder with a delivered reply or failure.
    ///
    /// Replies for anything but the outstanding request are dropped without touching
    /// the log.
    pub fn apply_reply(&mut self, event: ReplyEvent) -> Result<ReplyApplied, ReplyRejection> {
        let transition = match &event.outcome {
            ReplyOutcome::Reply(_) => SessionTransition::ReplyArrived(event.target),
            ReplyOutcome::Failed(_) => SessionTransition::GenerationFailed(event.target),
        };

        let next_state = match self.state.apply(transition) {
            Ok(next_state) => next_state,
            Err(rejection) => {
                tracing::warn!(
                    target = ?event.target,
                    rejection = ?rejection,
                    "dropping reply that does not match the outstanding request"
                );
                return Err(match rejection {
                    TransitionRejection::NoOutstandingRequest => {
                        ReplyRejection::NoOutstandingRequest
                    }
                    TransitionRejection::RequestMismatch { active, attempted }
                    | TransitionRejection::AlreadyAwaiting { active, attempted } => {
                        ReplyRejection::Stale { active, attempted }
                    }
                });
            }
        };

        if self.store.composing().is_none() {
            tracing::error!(target = ?event.target, "outstanding request has no placeholder");
            return Err(ReplyRejection::MissingPlaceholder);
        }

        let message_id = self.alloc_message_id();
        let (message, applied) = match event.outcome {
            ReplyOutcome::Reply(text) => (
                Message::assistant(message_id, text),
                ReplyApplied::Replied { message_id },
            ),
            ReplyOutcome::Failed(reason) => {
                tracing::warn!(target = ?event.target, reason = %reason, "reply generation failed");
                (
                    Message::generation_failed(message_id, reason),
                    ReplyApplied::Failed { message_id },
                )
            }
        };

        match self.store.resolve_composing(message) {
            Ok(placeholder_id) => {
                tracing::debug!(
                    target = ?event.target,
                    placeholder_id = %placeholder_id,
                    message_id = %message_id,
                    "composing placeholder resolved"
                );
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to resolve composing placeholder");
                return Err(ReplyRejection::MissingPlaceholder);
            }
        }

        self.state = next_state;
        if let Some(active) = self.active_reply.take() {
            debug_assert_eq!(active.target, event.target);
            self.release_attachments(&active.sent_attachments);
        }
        self.follow_tail();

        Ok(applied)
    }

    /// Waits for the outstanding reply and applies it.
    pub async fn run_until_idle(&mut self) -> Option<Result<ReplyApplied, ReplyRejection>> {
        let event = self.wait_for_reply().await?;
        Some(self.apply_reply(event))
    }

    pub fn observe_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        self.scroll.observe(metrics)
    }

    pub fn jump_to_latest(&mut self) {
        self.pending_scroll = Some(self.scroll.jump_to_latest());
    }

    /// Takes the scroll command queued by the last append or jump, if any.
    pub fn take_scroll_command(&mut self) -> Option<ScrollCommand> {
        self.pending_scroll.take()
    }

    pub fn dispatch(&self, command: SessionCommand) {
        tracing::debug!(command = ?command, "dispatching session command");
        self.commands.dispatch(command, self.store.messages());
    }

    /// Cancels any outstanding request. The log and state are left as they are.
    pub fn shutdown(&mut self) {
        if let Some(active) = self.active_reply.take() {
            tracing::debug!(
                target = ?active.target,
                placeholder_id = %active.placeholder_id,
                "cancelling outstanding reply on teardown"
            );
            drop(active);
        }
    }

    fn release_attachments(&mut self, sent: &[AttachmentId]) {
        for id in sent {
            self.pending_attachments.remove(*id);
        }
    }

    fn follow_tail(&mut self) {
        if let Some(command) = self.scroll.on_message_appended(None) {
            self.pending_scroll = Some(command);
        }
    }

    fn alloc_message_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id = self.next_message_id.saturating_add(1);
        id
    }

    fn alloc_request_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id = self.next_request_id.saturating_add(1);
        id
    }
}
