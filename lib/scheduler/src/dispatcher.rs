//! Trigger dispatcher.
//!
//! Runs a trigger's action and records the result. `fire` never fails: an
//! action error or panic becomes a failed [`ExecutionRecord`], and exactly
//! one record is appended to the execution log per call.

use crate::clock::Clock;
use crate::error::ActionError;
use crate::execution::{ExecutionLog, ExecutionRecord};
use crate::trigger::Trigger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_triggers_core::ExecutionId;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// The side effect a trigger performs when it fires.
///
/// This abstraction keeps the engine independent of what firing means in a
/// deployment (emitting an event, calling a webhook, enqueueing work).
#[async_trait]
pub trait TriggerAction: Send + Sync {
    /// Performs the action for `trigger`.
    async fn run(&self, trigger: &Trigger) -> Result<(), ActionError>;
}

/// Executes trigger actions and writes the execution log.
#[derive(Clone)]
pub struct Dispatcher {
    action: Arc<dyn TriggerAction>,
    log: Arc<dyn ExecutionLog>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    /// Creates a new dispatcher.
    pub fn new(
        action: Arc<dyn TriggerAction>,
        log: Arc<dyn ExecutionLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { action, log, clock }
    }

    /// Fires `trigger` and returns the appended record.
    ///
    /// `scheduled_for` is the due time the engine fired for, or `None` for a
    /// manual firing.
    pub async fn fire(
        &self,
        trigger: &Trigger,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> ExecutionRecord {
        let executed_at = self.clock.now();
        let action = Arc::clone(&self.action);
        let owned = trigger.clone();

        // Own task so a panicking action is contained.
        let result = match tokio::spawn(async move { action.run(&owned).await }).await {
            Ok(result) => result,
            Err(join_error) => Err(ActionError::Aborted {
                message: join_error.to_string(),
            }),
        };

        let record = match result {
            Ok(()) => {
                debug!(trigger = %trigger.name, "trigger action succeeded");
                ExecutionRecord::success(
                    &trigger.name,
                    scheduled_for,
                    executed_at,
                    trigger.payload.clone(),
                )
            }
            Err(e) => {
                warn!(trigger = %trigger.name, error = %e, "trigger action failed");
                ExecutionRecord::failure(
                    &trigger.name,
                    scheduled_for,
                    executed_at,
                    trigger.payload.clone(),
                    e.to_string(),
                )
            }
        };

        if let Err(e) = self.log.append(&record).await {
            error!(
                trigger = %trigger.name,
                execution = %record.id,
                error = %e,
                "failed to append execution record"
            );
        }

        record
    }

    /// Deletes a record written by an earlier `fire`.
    pub async fn discard(&self, id: &ExecutionId) {
        match self.log.delete(id).await {
            Ok(deleted) => debug!(execution = %id, deleted, "discarded execution record"),
            Err(e) => warn!(execution = %id, error = %e, "failed to discard execution record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::error::StoreError;
    use crate::execution::{InMemoryExecutionLog, Outcome};
    use crate::trigger::TriggerSchedule;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Action that succeeds and counts invocations.
    #[derive(Default)]
    struct CountingAction {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TriggerAction for CountingAction {
        async fn run(&self, _trigger: &Trigger) -> Result<(), ActionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingAction;

    #[async_trait]
    impl TriggerAction for FailingAction {
        async fn run(&self, _trigger: &Trigger) -> Result<(), ActionError> {
            Err(ActionError::failed("downstream rejected"))
        }
    }

    struct PanickingAction;

    #[async_trait]
    impl TriggerAction for PanickingAction {
        async fn run(&self, _trigger: &Trigger) -> Result<(), ActionError> {
            panic!("action blew up");
        }
    }

    /// Log whose writes always fail.
    struct BrokenLog;

    #[async_trait]
    impl ExecutionLog for BrokenLog {
        async fn append(&self, _record: &ExecutionRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable {
                reason: "disk full".to_string(),
            })
        }

        async fn list(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn list_for(&self, _trigger_name: &str) -> Result<Vec<ExecutionRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn delete_for(&self, _trigger_name: &str) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn delete(&self, _id: &ExecutionId) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    fn manual_trigger() -> Trigger {
        Trigger::new("x", TriggerSchedule::Manual, Some(json!({"a": 1})), Utc::now())
    }

    #[tokio::test]
    async fn success_is_logged_once() {
        let action = Arc::new(CountingAction::default());
        let log = Arc::new(InMemoryExecutionLog::new());
        let dispatcher = Dispatcher::new(action.clone(), log.clone(), Arc::new(TokioClock::new()));

        let record = dispatcher.fire(&manual_trigger(), None).await;

        assert_eq!(record.outcome, Outcome::Success);
        assert_eq!(record.payload, Some(json!({"a": 1})));
        assert_eq!(action.calls.load(Ordering::SeqCst), 1);
        assert_eq!(log.list().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn action_error_becomes_failed_record() {
        let log = Arc::new(InMemoryExecutionLog::new());
        let dispatcher =
            Dispatcher::new(Arc::new(FailingAction), log.clone(), Arc::new(TokioClock::new()));

        let record = dispatcher.fire(&manual_trigger(), None).await;

        assert_eq!(record.outcome, Outcome::Failure);
        assert!(
            record
                .error_detail
                .as_deref()
                .is_some_and(|d| d.contains("downstream rejected"))
        );
        assert_eq!(log.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn panic_becomes_failed_record() {
        let log = Arc::new(InMemoryExecutionLog::new());
        let dispatcher =
            Dispatcher::new(Arc::new(PanickingAction), log.clone(), Arc::new(TokioClock::new()));

        let record = dispatcher.fire(&manual_trigger(), None).await;

        assert_eq!(record.outcome, Outcome::Failure);
        assert!(
            record
                .error_detail
                .as_deref()
                .is_some_and(|d| d.contains("panicked"))
        );
        assert_eq!(log.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn log_failure_still_returns_record() {
        let dispatcher = Dispatcher::new(
            Arc::new(CountingAction::default()),
            Arc::new(BrokenLog),
            Arc::new(TokioClock::new()),
        );

        let record = dispatcher.fire(&manual_trigger(), None).await;
        assert!(record.is_success());
    }

    #[tokio::test]
    async fn discard_deletes_the_fired_record() {
        let log = Arc::new(InMemoryExecutionLog::new());
        let dispatcher = Dispatcher::new(
            Arc::new(CountingAction::default()),
            log.clone(),
            Arc::new(TokioClock::new()),
        );

        let kept = dispatcher.fire(&manual_trigger(), None).await;
        let dropped = dispatcher.fire(&manual_trigger(), None).await;
        dispatcher.discard(&dropped.id).await;

        assert_eq!(log.list().await.unwrap(), vec![kept]);
    }
}
