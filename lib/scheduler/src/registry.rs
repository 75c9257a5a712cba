//! Trigger registration and control.
//!
//! [`TriggerRegistry`] is the one entry point callers use. It validates
//! requests, writes the store first, and only then touches the timer engine,
//! so a failed persist is never reflected in the schedule.

use crate::clock::Clock;
use crate::config::{LogRetention, SchedulerConfig};
use crate::dispatcher::{Dispatcher, TriggerAction};
use crate::engine::{EngineHandle, PendingFire, TimerEngine};
use crate::error::{StoreError, TriggerError};
use crate::execution::{ExecutionLog, ExecutionRecord};
use crate::store::TriggerStore;
use crate::trigger::{RegisterTrigger, Trigger};
use event_triggers_core::Result as CoreResult;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Registration and control surface over the store, log and engine.
pub struct TriggerRegistry {
    store: Arc<dyn TriggerStore>,
    log: Arc<dyn ExecutionLog>,
    engine: EngineHandle,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    retention: LogRetention,
    // Serializes register/remove so a name is never half-registered.
    writes: Mutex<()>,
}

impl TriggerRegistry {
    /// Creates a registry over an already running engine.
    pub fn new(
        store: Arc<dyn TriggerStore>,
        log: Arc<dyn ExecutionLog>,
        engine: EngineHandle,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        retention: LogRetention,
    ) -> Self {
        Self {
            store,
            log,
            engine,
            dispatcher,
            clock,
            retention,
            writes: Mutex::new(()),
        }
    }

    /// Starts a timer engine seeded from `store` and returns a registry
    /// driving it, along with the engine task.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the store cannot be read while seeding.
    pub async fn start(
        store: Arc<dyn TriggerStore>,
        log: Arc<dyn ExecutionLog>,
        action: Arc<dyn TriggerAction>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> CoreResult<(Self, JoinHandle<()>), TriggerError> {
        let retention = config.log_retention;
        let dispatcher = Dispatcher::new(action, Arc::clone(&log), Arc::clone(&clock));
        let (engine, task) = TimerEngine::start(
            Arc::clone(&store),
            dispatcher.clone(),
            Arc::clone(&clock),
            config,
        )
        .await?;

        Ok((
            Self::new(store, log, engine, dispatcher, clock, retention),
            task,
        ))
    }

    /// Registers a trigger.
    ///
    /// Manual triggers are only stored. One-shot and recurring triggers are
    /// also handed to the timer engine, due `schedule` seconds from now.
    ///
    /// # Errors
    ///
    /// - `InvalidName` / `InvalidSchedule` if the request is malformed
    /// - `AlreadyExists` if the name is taken
    /// - `StoreUnavailable` if the store write fails
    /// - `EngineUnavailable` if the engine has stopped; nothing is stored
    #[instrument(skip(self, request), fields(trigger = %request.name, kind = %request.kind))]
    pub async fn register(&self, request: RegisterTrigger) -> CoreResult<Trigger, TriggerError> {
        let schedule = request.validate()?;
        let _guard = self.writes.lock().await;

        let trigger = Trigger::new(request.name, schedule, request.payload, self.clock.now());
        let trigger = self
            .store
            .create(trigger)
            .await
            .map_err(TriggerError::from)?;

        if trigger.is_scheduled_kind() {
            if let Err(e) = self.engine.schedule(trigger.clone()).await {
                if let Err(rollback) = self.store.delete(&trigger.name).await {
                    warn!(error = %rollback, "failed to roll back trigger after engine error");
                }
                return Err(e.into());
            }
        }

        info!(next_fire_at = ?trigger.next_fire_at, "trigger registered");
        Ok(trigger)
    }

    /// Removes a trigger from the engine and the store.
    ///
    /// The engine is told first, so no new firing starts once the store
    /// delete is under way. A firing already in flight completes. Execution
    /// history is kept or deleted according to the configured retention; with
    /// `Cascade`, records of firings still in flight are deleted as they
    /// complete.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown name and `StoreUnavailable` if the
    /// store delete fails, in which case the trigger is handed back to the
    /// engine at the due time it was waiting for.
    #[instrument(skip(self))]
    pub async fn remove(&self, name: &str) -> CoreResult<(), TriggerError> {
        let _guard = self.writes.lock().await;

        self.store.get(name).await.map_err(TriggerError::from)?;

        let cancelled = match self.engine.cancel(name).await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                warn!(error = %e, "timer engine unavailable while removing trigger");
                None
            }
        };

        if let Err(e) = self.store.delete(name).await {
            if let Some(trigger) = cancelled {
                if let Err(restore) = self.engine.schedule(trigger).await {
                    warn!(error = %restore, "failed to reschedule trigger after store error");
                }
            }
            return Err(TriggerError::from(e).into());
        }

        let mut executions_deleted = 0;
        if self.retention == LogRetention::Cascade {
            if let Err(e) = self.engine.purge_history(name).await {
                warn!(error = %e, "timer engine unavailable while purging history");
            }
            match self.log.delete_for(name).await {
                Ok(count) => executions_deleted = count,
                Err(e) => warn!(error = %e, "failed to delete execution history"),
            }
        }

        info!(
            was_scheduled = cancelled.is_some(),
            executions_deleted,
            "trigger removed"
        );
        Ok(())
    }

    /// Fires a manual trigger now and returns its execution record.
    ///
    /// The record carries the trigger's stored payload. A failing action
    /// still produces a record, with a failure outcome.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown name and `NotManual` for one-shot
    /// or recurring triggers.
    #[instrument(skip(self))]
    pub async fn fire_manual(&self, name: &str) -> CoreResult<ExecutionRecord, TriggerError> {
        let trigger = self.store.get(name).await.map_err(TriggerError::from)?;
        if trigger.is_scheduled_kind() {
            return Err(TriggerError::NotManual {
                name: name.to_string(),
            }
            .into());
        }

        let record = self.dispatcher.fire(&trigger, None).await;
        if self.retention == LogRetention::Cascade
            && matches!(self.store.get(name).await, Err(StoreError::NotFound { .. }))
        {
            // Removed while the action ran.
            self.dispatcher.discard(&record.id).await;
        }
        info!(execution = %record.id, outcome = %record.outcome, "manual trigger fired");
        Ok(record)
    }

    /// Lists all triggers with their status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn list(&self) -> CoreResult<Vec<Trigger>, TriggerError> {
        Ok(self.store.list().await.map_err(TriggerError::from)?)
    }

    /// Gets one trigger.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown name.
    #[instrument(skip(self))]
    pub async fn get(&self, name: &str) -> CoreResult<Trigger, TriggerError> {
        Ok(self.store.get(name).await.map_err(TriggerError::from)?)
    }

    /// Lists execution records, optionally for one trigger only.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the log cannot be read.
    #[instrument(skip(self))]
    pub async fn executions(
        &self,
        trigger_name: Option<&str>,
    ) -> CoreResult<Vec<ExecutionRecord>, TriggerError> {
        let records = match trigger_name {
            Some(name) => self.log.list_for(name).await,
            None => self.log.list().await,
        };
        Ok(records.map_err(TriggerError::from)?)
    }

    /// Returns the engine's pending-fire index in firing order.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` if the engine has stopped.
    pub async fn pending(&self) -> CoreResult<Vec<PendingFire>, TriggerError> {
        Ok(self.engine.pending().await?)
    }

    /// Stops the timer engine. In-flight firings are drained by the engine
    /// task.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}
