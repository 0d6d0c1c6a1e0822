use std::time::Duration;

use futures::future::BoxFuture;
use snafu::Snafu;
use tokio::sync::oneshot;

/// Identifier for one conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Identifier for one reply request.
///
/// This must change on every submit so stale replies can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Routing key used for stale-reply rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplyTarget {
    pub session_id: SessionId,
    pub request_id: RequestId,
}

impl ReplyTarget {
    pub const fn new(session_id: SessionId, request_id: RequestId) -> Self {
        Self {
            session_id,
            request_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub backend_id: String,
    pub delay_min: Duration,
    pub delay_max: Duration,
}

impl BackendConfig {
    pub fn new(backend_id: impl Into<String>, delay_min: Duration, delay_max: Duration) -> Self {
        Self {
            backend_id: backend_id.into().trim().to_string(),
            delay_min,
            delay_max,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(
            super::SIMULATED_BACKEND_ID,
            super::DEFAULT_DELAY_MIN,
            super::DEFAULT_DELAY_MAX,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRequest {
    pub target: ReplyTarget,
    pub utterance: String,
}

impl ReplyRequest {
    pub fn new(target: ReplyTarget, utterance: impl Into<String>) -> Self {
        Self {
            target,
            utterance: utterance.into(),
        }
    }
}

/// Terminal result of one reply request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Reply(String),
    /// Generation error reported by the backend; distinct from a successful reply.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEvent {
    pub target: ReplyTarget,
    pub outcome: ReplyOutcome,
}

impl ReplyEvent {
    pub fn reply(target: ReplyTarget, text: impl Into<String>) -> Self {
        Self {
            target,
            outcome: ReplyOutcome::Reply(text.into()),
        }
    }

    pub fn failed(target: ReplyTarget, message: impl Into<String>) -> Self {
        Self {
            target,
            outcome: ReplyOutcome::Failed(message.into()),
        }
    }
}

pub type ReplyWorker = BoxFuture<'static, ()>;
pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("reply backend '{backend_id}' is not supported"))]
    UnsupportedBackend {
        stage: &'static str,
        backend_id: String,
    },
    #[snafu(display("reply delay window {min:?}..={max:?} is inverted"))]
    InvalidDelayWindow {
        stage: &'static str,
        min: Duration,
        max: Duration,
    },
    #[snafu(display("reply request for {target:?} was rejected: {details}"))]
    RequestRejected {
        stage: &'static str,
        target: ReplyTarget,
        details: String,
    },
}

/// Single-shot, cancellable receiver for one reply.
///
/// Dropping it signals cancellation to the worker, so a torn-down session never
/// observes a late reply.
pub struct PendingReply {
    target: ReplyTarget,
    event_rx: Option<oneshot::Receiver<ReplyEvent>>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

pub struct ReplyHandle {
    pub reply: PendingReply,
    pub worker: ReplyWorker,
}

impl PendingReply {
    pub(crate) fn new(
        target: ReplyTarget,
        event_rx: oneshot::Receiver<ReplyEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            target,
            event_rx: Some(event_rx),
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn target(&self) -> ReplyTarget {
        self.target
    }

    /// Waits for the reply. Returns `None` once the reply was consumed, the request was
    /// cancelled, or the worker went away without answering.
    pub async fn recv(&mut self) -> Option<ReplyEvent> {
        let event_rx = self.event_rx.as_mut()?;
        let event = event_rx.await.ok();
        self.event_rx = None;
        self.cancel_tx = None;
        event
    }

    pub fn try_recv(&mut self) -> Option<ReplyEvent> {
        let event = self.event_rx.as_mut()?.try_recv().ok()?;
        self.event_rx = None;
        self.cancel_tx = None;
        Some(event)
    }

    pub fn cancel(&mut self) -> bool {
        self.event_rx = None;
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Contract every reply generator satisfies: asynchronous, one reply per request,
/// cancellable, and able to report a generation error distinct from success.
pub trait ReplyBackend: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn request(&self, request: ReplyRequest) -> BackendResult<ReplyHandle>;
}

/// Builds the channel pair shared by a backend worker and its [`PendingReply`].
pub fn make_pending_reply(
    target: ReplyTarget,
) -> (
    oneshot::Sender<ReplyEvent>,
    PendingReply,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = oneshot::channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        PendingReply::new(target, event_rx, cancel_tx),
        cancel_rx,
    )
}
