use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use murmur_chat::chat::{
    CommandSink, ContentHandle, FileCandidate, Message, MessageStatus, Notice, Notifier,
    RejectionReason, ReplyApplied, ReplyRejection, Role, ScrollCommand, ScrollMetrics,
    SendIntent, SessionCommand, SessionEngine, SessionState, SubmitOutcome, SubmitRejection,
};
use murmur_chat::settings::{DEFAULT_GREETING, SessionSettings};
use murmur_llm::{
    BackendConfig, BackendError, BackendResult, ReplyBackend, ReplyEvent, ReplyHandle,
    ReplyRequest, ReplyTarget, RequestId, SequenceSource, SimulatedBackend, candidate_replies,
    make_pending_reply,
};

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notices lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().expect("notices lock").push(notice);
    }
}

#[derive(Default)]
struct RecordingCommands {
    dispatched: Mutex<Vec<(SessionCommand, usize)>>,
}

impl CommandSink for RecordingCommands {
    fn dispatch(&self, command: SessionCommand, messages: &[Message]) {
        self.dispatched
            .lock()
            .expect("commands lock")
            .push((command, messages.len()));
    }
}

enum Scripted {
    Fail(&'static str),
    Reject,
    Silent,
}

struct ScriptedBackend(Scripted);

impl ReplyBackend for ScriptedBackend {
    fn id(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        "Scripted test backend"
    }

    fn request(&self, request: ReplyRequest) -> BackendResult<ReplyHandle> {
        let (event_tx, reply, _cancel_rx) = make_pending_reply(request.target);
        match self.0 {
            Scripted::Reject => Err(BackendError::RequestRejected {
                stage: "scripted-request",
                target: request.target,
                details: "quota exhausted".to_string(),
            }),
            Scripted::Fail(reason) => {
                let event = ReplyEvent::failed(request.target, reason);
                Ok(ReplyHandle {
                    reply,
                    worker: Box::pin(async move {
                        let _ = event_tx.send(event);
                    }),
                })
            }
            Scripted::Silent => Ok(ReplyHandle {
                reply,
                worker: Box::pin(async move {
                    drop(event_tx);
                }),
            }),
        }
    }
}

fn quiet_settings() -> SessionSettings {
    SessionSettings::default().without_greeting()
}

fn simulated(draws: Vec<u64>) -> Arc<dyn ReplyBackend> {
    Arc::new(
        SimulatedBackend::with_source(&BackendConfig::default(), SequenceSource::new(draws))
            .expect("default delay window is valid"),
    )
}

fn engine_with(
    backend: Arc<dyn ReplyBackend>,
) -> (SessionEngine, Arc<RecordingNotifier>, Arc<RecordingCommands>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let commands = Arc::new(RecordingCommands::default());
    let engine = SessionEngine::with_collaborators(
        backend,
        &quiet_settings(),
        notifier.clone(),
        commands.clone(),
    );
    (engine, notifier, commands)
}

fn pdf(name: &str, size_bytes: u64) -> FileCandidate {
    FileCandidate::new(name, size_bytes, ContentHandle::Path(PathBuf::from(name)))
        .with_mime_type("application/pdf")
}

fn composing_count(messages: &[Message]) -> usize {
    messages.iter().filter(|message| message.is_composing()).count()
}

#[tokio::test(start_paused = true)]
async fn hello_round_trip_resolves_placeholder_in_place() {
    let (mut engine, _, _) = engine_with(simulated(vec![2, 0]));

    let outcome = engine.submit(SendIntent::new("Hello"));
    let SubmitOutcome::Accepted {
        user_message_id,
        placeholder_id,
        ..
    } = outcome
    else {
        panic!("submit should be accepted, got {outcome:?}");
    };

    let pending = engine.snapshot();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id, user_message_id);
    assert_eq!(pending[0].role, Role::User);
    assert_eq!(pending[0].content, "Hello");
    assert_eq!(pending[1].id, placeholder_id);
    assert!(pending[1].is_composing());
    assert!(pending[1].content.is_empty());
    assert!(engine.is_busy());

    let started = tokio::time::Instant::now();
    let applied = engine
        .run_until_idle()
        .await
        .expect("a reply was outstanding")
        .expect("reply matches the outstanding request");
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert!(started.elapsed() <= Duration::from_millis(2500));

    let resolved = engine.snapshot();
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[0], pending[0]);
    assert_eq!(resolved[1].role, Role::Assistant);
    assert_eq!(resolved[1].status, MessageStatus::Done);
    assert_eq!(resolved[1].content, candidate_replies("Hello")[2]);
    assert!(resolved[1].content.contains("\"Hello...\""));
    assert_eq!(
        applied,
        ReplyApplied::Replied {
            message_id: resolved[1].id
        }
    );
    assert_eq!(engine.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn every_accepted_submit_adds_exactly_two_messages() {
    let (mut engine, _, _) = engine_with(simulated(vec![0, 1, 2, 7, 999]));

    for round in 1..=5 {
        let outcome = engine.submit(SendIntent::new(format!("question {round}")));
        assert!(matches!(outcome, SubmitOutcome::Accepted { .. }));
        assert_eq!(composing_count(engine.messages()), 1);

        engine
            .run_until_idle()
            .await
            .expect("reply outstanding")
            .expect("reply applied");

        assert_eq!(engine.messages().len(), round * 2);
        assert_eq!(composing_count(engine.messages()), 0);
    }

    let ids = engine
        .messages()
        .iter()
        .map(|message| message.id)
        .collect::<Vec<_>>();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn blank_submit_without_files_changes_nothing() {
    let (mut engine, notifier, _) = engine_with(simulated(vec![0]));

    for text in ["", "   ", "\n\t "] {
        assert_eq!(engine.submit(SendIntent::new(text)), SubmitOutcome::Ignored);
    }

    assert!(engine.snapshot().is_empty());
    assert_eq!(engine.state(), SessionState::Idle);
    assert!(notifier.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn submit_while_awaiting_reply_is_refused() {
    let (mut engine, _, _) = engine_with(simulated(vec![0]));
    let SubmitOutcome::Accepted { target, .. } = engine.submit(SendIntent::new("first")) else {
        panic!("first submit should be accepted");
    };
    let before = engine.snapshot();

    let outcome = engine.submit(SendIntent::new("second"));

    assert_eq!(
        outcome,
        SubmitOutcome::Rejected(SubmitRejection::Busy { active: target })
    );
    assert_eq!(engine.snapshot(), before);
    assert_eq!(engine.state(), SessionState::AwaitingReply(target));
}

#[tokio::test(start_paused = true)]
async fn file_only_submit_uses_upload_description() {
    let (mut engine, notifier, _) = engine_with(simulated(vec![0]));

    let report = engine.attach_files([pdf("report.pdf", 2048)]);
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(engine.pending_attachments().len(), 1);

    let outcome = engine.submit_pending("");
    assert!(matches!(outcome, SubmitOutcome::Accepted { .. }));

    let user = &engine.snapshot()[0];
    assert_eq!(user.content, "Uploaded 1 file(s)");
    assert_eq!(user.attachments, vec!["report.pdf".to_string()]);
    assert_eq!(notifier.notices(), vec![Notice::FilesAccepted { count: 1 }]);
    // Still listed until the reply lands.
    assert_eq!(engine.pending_attachments().len(), 1);

    engine
        .run_until_idle()
        .await
        .expect("reply outstanding")
        .expect("reply applied");

    assert!(engine.pending_attachments().is_empty());
}

#[tokio::test]
async fn oversized_file_is_reported_and_not_queued() {
    let (mut engine, notifier, _) = engine_with(simulated(vec![0]));

    let report = engine.attach_files([pdf("exact.pdf", 10_485_760), pdf("huge.pdf", 10_485_761)]);

    assert_eq!(report.accepted.len(), 1);
    assert_eq!(engine.pending_attachments().names(), vec!["exact.pdf"]);
    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    let Notice::AttachmentRejected(rejection) = &notices[0] else {
        panic!("expected a rejection notice, got {notices:?}");
    };
    assert_eq!(rejection.name, "huge.pdf");
    assert!(matches!(rejection.reason, RejectionReason::TooLarge { .. }));
    assert!(engine.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn removed_attachment_is_not_sent() {
    let (mut engine, _, _) = engine_with(simulated(vec![0]));
    let report = engine.attach_files([pdf("keep.pdf", 10), pdf("drop.pdf", 10)]);

    let removed = engine
        .remove_attachment(report.accepted[1].id)
        .expect("attachment was pending");
    assert_eq!(removed.name, "drop.pdf");

    engine.submit_pending("see attached");

    let user = &engine.snapshot()[0];
    assert_eq!(user.content, "see attached");
    assert_eq!(user.attachments, vec!["keep.pdf".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn stale_reply_is_dropped_without_touching_log() {
    let (mut engine, _, _) = engine_with(simulated(vec![0]));
    let SubmitOutcome::Accepted { target, .. } = engine.submit(SendIntent::new("current")) else {
        panic!("submit should be accepted");
    };
    let before = engine.snapshot();

    let stale = ReplyTarget::new(target.session_id, RequestId::new(target.request_id.0 + 41));
    let result = engine.apply_reply(ReplyEvent::reply(stale, "late answer"));

    assert_eq!(
        result,
        Err(ReplyRejection::Stale {
            active: target,
            attempted: stale,
        })
    );
    assert_eq!(engine.snapshot(), before);
    assert!(engine.is_busy());

    engine
        .run_until_idle()
        .await
        .expect("reply outstanding")
        .expect("genuine reply applied");
    assert!(!engine.is_busy());
}

#[tokio::test]
async fn reply_with_nothing_outstanding_is_a_no_op() {
    let (mut engine, _, _) = engine_with(simulated(vec![0]));
    let target = ReplyTarget::new(engine.session_id(), RequestId::new(1));

    let result = engine.apply_reply(ReplyEvent::reply(target, "ghost"));

    assert_eq!(result, Err(ReplyRejection::NoOutstandingRequest));
    assert!(engine.snapshot().is_empty());
    assert!(engine.wait_for_reply().await.is_none());
}

#[tokio::test]
async fn generation_failure_becomes_assistant_error_and_allows_retry() {
    let (mut engine, _, _) = engine_with(Arc::new(ScriptedBackend(Scripted::Fail(
        "model overloaded",
    ))));

    engine.submit(SendIntent::new("Hello"));
    let applied = engine
        .run_until_idle()
        .await
        .expect("reply outstanding")
        .expect("failure applied");

    let messages = engine.snapshot();
    assert_eq!(messages.len(), 2);
    assert!(matches!(applied, ReplyApplied::Failed { .. }));
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(
        messages[1].status,
        MessageStatus::Failed("model overloaded".to_string())
    );
    assert!(messages[1].content.contains("model overloaded"));
    assert_eq!(engine.state(), SessionState::Idle);

    assert!(matches!(
        engine.submit(SendIntent::new("Hello again")),
        SubmitOutcome::Accepted { .. }
    ));
}

#[tokio::test]
async fn rejected_request_fails_immediately() {
    let (mut engine, _, _) = engine_with(Arc::new(ScriptedBackend(Scripted::Reject)));

    let outcome = engine.submit(SendIntent::new("Hello"));

    assert!(matches!(outcome, SubmitOutcome::Accepted { .. }));
    let messages = engine.snapshot();
    assert_eq!(messages.len(), 2);
    assert!(matches!(messages[1].status, MessageStatus::Failed(_)));
    assert!(messages[1].content.contains("quota exhausted"));
    assert!(!engine.is_busy());
}

#[tokio::test]
async fn silent_backend_does_not_leave_session_hanging() {
    let (mut engine, _, _) = engine_with(Arc::new(ScriptedBackend(Scripted::Silent)));
    engine.submit(SendIntent::new("Hello"));

    let applied = engine
        .run_until_idle()
        .await
        .expect("reply outstanding")
        .expect("failure applied");

    assert!(matches!(applied, ReplyApplied::Failed { .. }));
    assert_eq!(composing_count(engine.messages()), 0);
    assert!(!engine.is_busy());
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_without_mutation() {
    let (mut engine, _, _) = engine_with(simulated(vec![0]));
    engine.submit(SendIntent::new("Hello"));
    let before = engine.snapshot();

    engine.shutdown();
    tokio::time::advance(Duration::from_secs(5)).await;

    assert_eq!(engine.snapshot(), before);
    assert!(engine.wait_for_reply().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn new_messages_follow_tail_only_while_attached() {
    let (mut engine, _, _) = engine_with(simulated(vec![0]));

    engine.submit(SendIntent::new("first"));
    assert_eq!(
        engine.take_scroll_command(),
        Some(ScrollCommand::ScrollToTail)
    );
    assert_eq!(engine.take_scroll_command(), None);

    assert!(engine.observe_scroll(ScrollMetrics::new(1000.0, 350.0, 500.0)));
    assert!(engine.view().show_jump_to_latest);

    engine
        .run_until_idle()
        .await
        .expect("reply outstanding")
        .expect("reply applied");
    assert_eq!(engine.take_scroll_command(), None);

    engine.jump_to_latest();
    assert_eq!(
        engine.take_scroll_command(),
        Some(ScrollCommand::ScrollToTail)
    );
    assert!(engine.view().show_jump_to_latest);

    assert!(!engine.observe_scroll(ScrollMetrics::new(1000.0, 450.0, 500.0)));
    assert!(!engine.view().show_jump_to_latest);
}

#[tokio::test(start_paused = true)]
async fn over_limit_text_is_sent_with_a_warning() {
    let (mut engine, notifier, _) = engine_with(simulated(vec![0]));
    let long_text = "a".repeat(2001);

    let outcome = engine.submit(SendIntent::new(long_text.clone()));

    assert!(matches!(outcome, SubmitOutcome::Accepted { .. }));
    assert_eq!(engine.snapshot()[0].content, long_text);
    assert_eq!(
        notifier.notices(),
        vec![Notice::TextOverLimit {
            length: 2001,
            limit: 2000,
        }]
    );
}

#[tokio::test]
async fn default_settings_seed_a_greeting() {
    let engine = SessionEngine::from_settings(&SessionSettings::default())
        .expect("simulated backend is available");

    let messages = engine.snapshot();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::Assistant);
    assert_eq!(messages[0].content, DEFAULT_GREETING);
    assert!(!engine.is_busy());
}

#[tokio::test]
async fn commands_are_forwarded_with_the_log() {
    let (mut engine, _, commands) = engine_with(Arc::new(ScriptedBackend(Scripted::Fail("x"))));
    engine.submit(SendIntent::new("Hello"));
    engine.run_until_idle().await;

    engine.dispatch(SessionCommand::ExportChat);
    engine.dispatch(SessionCommand::ClearChats);

    assert_eq!(
        *commands.dispatched.lock().expect("commands lock"),
        vec![
            (SessionCommand::ExportChat, 2),
            (SessionCommand::ClearChats, 2),
        ]
    );
    // Clearing is the collaborator's job; the engine never deletes.
    assert_eq!(engine.snapshot().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn greeting_stays_ahead_of_the_first_exchange() {
    let mut engine = SessionEngine::new(simulated(vec![0]), &SessionSettings::default());

    engine.submit(SendIntent::new("Hello"));
    let pending = engine.snapshot();
    assert_eq!(pending.len(), 3);
    assert_eq!(pending[0].content, DEFAULT_GREETING);
    assert_eq!(pending[1].content, "Hello");
    assert!(pending[2].is_composing());

    engine
        .run_until_idle()
        .await
        .expect("reply outstanding")
        .expect("reply applied");

    let resolved = engine.snapshot();
    assert_eq!(resolved.len(), 3);
    assert_eq!(resolved[0], pending[0]);
    assert_eq!(resolved[2].content, candidate_replies("Hello")[0]);
}

#[tokio::test]
async fn clearing_queued_files_empties_the_list() {
    let (mut engine, _, _) = engine_with(simulated(vec![0]));
    engine.attach_files([pdf("a.pdf", 1), pdf("b.pdf", 2)]);

    assert_eq!(engine.clear_attachments(), 2);
    assert!(engine.pending_attachments().is_empty());
    assert_eq!(engine.submit_pending("   "), SubmitOutcome::Ignored);
    assert_eq!(engine.max_attachment_bytes(), 10_485_760);
}

#[test]
fn ignored_submit_does_not_need_a_runtime() {
    let (mut engine, _, _) = engine_with(simulated(vec![0]));

    assert_eq!(engine.submit(SendIntent::new("  ")), SubmitOutcome::Ignored);
    assert!(engine.snapshot().is_empty());
}

#[test]
#[should_panic]
fn accepted_submit_outside_a_runtime_panics() {
    let (mut engine, _, _) = engine_with(simulated(vec![0]));

    engine.submit(SendIntent::new("Hello"));
}
