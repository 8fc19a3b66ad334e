use std::sync::Arc;

use tracing::{info, warn};

use crate::core::{
    error::SyncError,
    retry::{RetryPolicy, Sleeper},
    types::TransformedEvent,
};
use crate::sources::misp::EventSink;

pub const SOURCE_TAG: &str = "anyrun";
pub const THREAT_LEVEL_TAG_PREFIX: &str = "anyrun:threat_level:";

#[derive(Debug)]
pub enum RegistrationOutcome {
    Created(String),
    AlreadyExists,
    Failed(SyncError),
}

/// The one place that knows how the platform words a duplicate submission.
pub fn is_duplicate_event(error_text: &str, marker: &str) -> bool {
    !marker.is_empty() && error_text.contains(marker)
}

/// Submits events, retrying transient failures and treating duplicates as done.
pub struct EventRegistrar {
    sink: Arc<dyn EventSink>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    duplicate_marker: String,
}

impl EventRegistrar {
    pub fn new(
        sink: Arc<dyn EventSink>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        duplicate_marker: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            policy,
            sleeper,
            duplicate_marker: duplicate_marker.into(),
        }
    }

    pub async fn register(&self, mut event: TransformedEvent) -> RegistrationOutcome {
        event.add_tag(SOURCE_TAG);
        match event.threat_level_id() {
            Some(level) => event.add_tag(&format!("{THREAT_LEVEL_TAG_PREFIX}{level}")),
            None => tracing::debug!("event has no threat_level_id; threat level tag skipped"),
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.sink.submit(event.as_value()).await {
                Ok(id) => {
                    info!("registered event id={}", id);
                    return RegistrationOutcome::Created(id);
                }
                Err(err) => err,
            };

            let text = err.to_string();
            if is_duplicate_event(&text, &self.duplicate_marker) {
                info!("event already present on the platform");
                return RegistrationOutcome::AlreadyExists;
            }
            if attempt >= self.policy.max_attempts() {
                return RegistrationOutcome::Failed(SyncError::RegistrationFailed {
                    attempts: attempt,
                    last_error: text,
                });
            }

            let delay = self.policy.delay_after(attempt);
            warn!(
                "registration attempt {}/{} failed: {}; retrying in {:?}",
                attempt,
                self.policy.max_attempts(),
                text,
                delay
            );
            self.sleeper.sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::Mutex,
        time::Duration,
    };

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;

    struct ScriptedSink {
        replies: Mutex<VecDeque<Result<String, SyncError>>>,
        seen: Mutex<Vec<Value>>,
    }

    impl ScriptedSink {
        fn new(replies: Vec<Result<String, SyncError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl EventSink for ScriptedSink {
        async fn submit(&self, event: &Value) -> Result<String, SyncError> {
            self.seen.lock().unwrap().push(event.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SyncError::Platform("no scripted reply".into())))
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn event() -> TransformedEvent {
        TransformedEvent::from_value(json!({
            "Event": { "info": "x", "threat_level_id": "2", "Attribute": [] }
        }))
        .unwrap()
    }

    fn registrar(
        sink: Arc<ScriptedSink>,
        sleeper: Arc<RecordingSleeper>,
        attempts: u32,
    ) -> EventRegistrar {
        EventRegistrar::new(
            sink,
            RetryPolicy::fixed(attempts, Duration::from_secs(10)),
            sleeper,
            "Event already exists",
        )
    }

    #[test]
    fn duplicate_predicate_needs_marker() {
        assert!(is_duplicate_event("403: Event already exists", "Event already exists"));
        assert!(!is_duplicate_event("403: forbidden", "Event already exists"));
        assert!(!is_duplicate_event("anything", ""));
    }

    #[tokio::test]
    async fn adds_source_and_threat_level_tags() {
        let sink = ScriptedSink::new(vec![Ok("11".into())]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let out = registrar(sink.clone(), sleeper, 5).register(event()).await;
        assert!(matches!(out, RegistrationOutcome::Created(id) if id == "11"));

        let sent = sink.seen.lock().unwrap()[0].clone();
        assert_eq!(
            sent["Event"]["Tag"],
            json!([{ "name": "anyrun" }, { "name": "anyrun:threat_level:2" }])
        );
    }

    #[tokio::test]
    async fn duplicate_is_success_without_retry() {
        let sink = ScriptedSink::new(vec![Err(SyncError::Platform(
            "status 403: {\"errors\":\"Event already exists\"}".into(),
        ))]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let out = registrar(sink.clone(), sleeper.clone(), 5)
            .register(event())
            .await;
        assert!(matches!(out, RegistrationOutcome::AlreadyExists));
        assert_eq!(sink.calls(), 1);
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let sink = ScriptedSink::new(vec![
            Err(SyncError::Timeout),
            Err(SyncError::Network("reset".into())),
            Ok("99".into()),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let out = registrar(sink.clone(), sleeper.clone(), 5)
            .register(event())
            .await;
        assert!(matches!(out, RegistrationOutcome::Created(id) if id == "99"));
        assert_eq!(sink.calls(), 3);
        assert_eq!(
            *sleeper.slept.lock().unwrap(),
            vec![Duration::from_secs(10), Duration::from_secs(10)]
        );
    }

    #[tokio::test]
    async fn exhausting_attempts_fails() {
        let sink = ScriptedSink::new(vec![]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let out = registrar(sink.clone(), sleeper.clone(), 3)
            .register(event())
            .await;
        match out {
            RegistrationOutcome::Failed(SyncError::RegistrationFailed { attempts, .. }) => {
                assert_eq!(attempts, 3)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sink.calls(), 3);
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);
    }
}
