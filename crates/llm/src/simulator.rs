use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use snafu::ensure;
use tokio::sync::oneshot;

use super::provider::{
    BackendConfig, BackendResult, InvalidDelayWindowSnafu, ReplyBackend, ReplyEvent, ReplyHandle,
    ReplyRequest, ReplyTarget, make_pending_reply,
};
use super::random::{RandomSource, RngSource};

pub const SIMULATED_BACKEND_ID: &str = "simulated";
pub const DEFAULT_DELAY_MIN: Duration = Duration::from_millis(1500);
pub const DEFAULT_DELAY_MAX: Duration = Duration::from_millis(2500);

/// One canned reply shape. The utterance echo is cut to `echo_chars` characters.
struct ReplyTemplate {
    echo_chars: usize,
    lead: &'static str,
    tail: &'static str,
}

const REPLY_TEMPLATES: [ReplyTemplate; 3] = [
    ReplyTemplate {
        echo_chars: 50,
        lead: "Thank you for your question about \"",
        tail: "...\". I'm here to assist you with government-related inquiries and provide accurate, helpful information.",
    },
    ReplyTemplate {
        echo_chars: 30,
        lead: "I understand you're asking about \"",
        tail: "...\". Let me provide you with some relevant information and guidance on this topic.",
    },
    ReplyTemplate {
        echo_chars: 40,
        lead: "That's a great question regarding \"",
        tail: "...\". Here's what I can tell you based on current government policies and procedures.",
    },
];

impl ReplyTemplate {
    fn render(&self, utterance: &str) -> String {
        let echo = utterance.chars().take(self.echo_chars).collect::<String>();
        format!("{}{}{}", self.lead, echo, self.tail)
    }
}

/// Every reply the simulator can produce for `utterance`, in template order.
pub fn candidate_replies(utterance: &str) -> Vec<String> {
    REPLY_TEMPLATES
        .iter()
        .map(|template| template.render(utterance))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedReply {
    pub text: String,
    pub delay: Duration,
}

/// Stand-in backend that answers with a templated echo after a randomized delay.
pub struct SimulatedBackend {
    delay_min: Duration,
    delay_max: Duration,
    source: Mutex<Box<dyn RandomSource>>,
}

impl SimulatedBackend {
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        Self::with_source(config, RngSource::from_entropy())
    }

    pub fn with_source(
        config: &BackendConfig,
        source: impl RandomSource + 'static,
    ) -> BackendResult<Self> {
        ensure!(
            config.delay_min <= config.delay_max,
            InvalidDelayWindowSnafu {
                stage: "simulated-backend-new",
                min: config.delay_min,
                max: config.delay_max,
            }
        );

        Ok(Self {
            delay_min: config.delay_min,
            delay_max: config.delay_max,
            source: Mutex::new(Box::new(source)),
        })
    }

    /// Draws the template and the delay for one request.
    pub fn compose_reply(&self, utterance: &str) -> SimulatedReply {
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);

        let index = source.next_below(REPLY_TEMPLATES.len() as u64) as usize;
        let template = &REPLY_TEMPLATES[index.min(REPLY_TEMPLATES.len() - 1)];

        let min_ms = self.delay_min.as_millis() as u64;
        let span_ms = (self.delay_max.as_millis() as u64).saturating_sub(min_ms);
        let delay = Duration::from_millis(min_ms + source.next_below(span_ms.saturating_add(1)));

        SimulatedReply {
            text: template.render(utterance),
            delay,
        }
    }

    async fn run_reply_worker(
        target: ReplyTarget,
        reply: SimulatedReply,
        event_tx: oneshot::Sender<ReplyEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        tokio::select! {
            _ = &mut cancel_rx => {
                tracing::debug!(target = ?target, "simulated reply cancelled before delivery");
            }
            _ = tokio::time::sleep(reply.delay) => {
                if event_tx.send(ReplyEvent::reply(target, reply.text)).is_err() {
                    tracing::debug!(target = ?target, "simulated reply receiver dropped");
                }
            }
        }
    }
}

impl ReplyBackend for SimulatedBackend {
    fn id(&self) -> &str {
        SIMULATED_BACKEND_ID
    }

    fn name(&self) -> &str {
        "Simulated assistant"
    }

    fn request(&self, request: ReplyRequest) -> BackendResult<ReplyHandle> {
        let reply = self.compose_reply(&request.utterance);
        tracing::debug!(
            target = ?request.target,
            delay_ms = reply.delay.as_millis() as u64,
            "scheduling simulated reply"
        );

        let (event_tx, pending, cancel_rx) = make_pending_reply(request.target);
        let worker = Self::run_reply_worker(request.target, reply, event_tx, cancel_rx).boxed();

        Ok(ReplyHandle {
            reply: pending,
            worker,
        })
    }
}
