use std::sync::Arc;

mod provider;
mod random;
mod simulator;

pub use provider::{
    BackendConfig, BackendError, BackendResult, PendingReply, ReplyBackend, ReplyEvent,
    ReplyHandle, ReplyOutcome, ReplyRequest, ReplyTarget, ReplyWorker, RequestId, SessionId,
    make_pending_reply,
};
pub use random::{RandomSource, RngSource, SequenceSource};
pub use simulator::{
    DEFAULT_DELAY_MAX, DEFAULT_DELAY_MIN, SIMULATED_BACKEND_ID, SimulatedBackend, SimulatedReply,
    candidate_replies,
};

pub fn create_backend(mut config: BackendConfig) -> BackendResult<Arc<dyn ReplyBackend>> {
    if config.backend_id.trim().is_empty() {
        config.backend_id = SIMULATED_BACKEND_ID.to_string();
    }

    match config.backend_id.as_str() {
        "simulated" | "mock" => {
            config.backend_id = SIMULATED_BACKEND_ID.to_string();
            Ok(Arc::new(SimulatedBackend::new(&config)?))
        }
        _ => Err(BackendError::UnsupportedBackend {
            stage: "create-backend",
            backend_id: config.backend_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_alias_ids_resolve_to_simulator() {
        for backend_id in ["", "  ", "mock", "simulated"] {
            let config = BackendConfig::new(backend_id, DEFAULT_DELAY_MIN, DEFAULT_DELAY_MAX);
            let backend = create_backend(config).expect("simulator is always available");
            assert_eq!(backend.id(), SIMULATED_BACKEND_ID);
        }
    }

    #[test]
    fn unknown_backend_is_unsupported() {
        let config = BackendConfig::new("openai", DEFAULT_DELAY_MIN, DEFAULT_DELAY_MAX);
        let error = create_backend(config).err().expect("unknown id fails");
        assert!(matches!(error, BackendError::UnsupportedBackend { .. }));
    }
}
