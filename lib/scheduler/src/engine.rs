//! Timer engine.
//!
//! One task owns the pending-fire index and is its only writer. Callers talk
//! to it through an [`EngineHandle`], whose messages are acknowledged once
//! applied. The loop suspends in exactly one place: until the earliest due
//! time or the next control message, whichever comes first. Control messages
//! are polled first, so a cancellation always lands before the next wake-up
//! decision.
//!
//! Due entries are handed to the [`Dispatcher`] on separate tasks. A slow
//! action therefore never delays other triggers. A due entry is only taken
//! off the heap once a dispatch permit is free, so the number of dispatch
//! tasks never exceeds `max_concurrent_dispatches`. A recurring trigger that
//! waited past further slots fires once, for the latest of them.
//!
//! Cancelled entries are not removed from the heap. Each schedule gets a
//! generation number, and heap entries whose generation no longer matches
//! the index are discarded when they surface.

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{StoreError, TriggerError};
use crate::schedule::{StartupPlan, latest_slot_at_or_before, next_recurring_fire, startup_plan};
use crate::store::TriggerStore;
use crate::trigger::{Trigger, TriggerKind, TriggerSchedule, TriggerStatus};
use chrono::{DateTime, Utc};
use event_triggers_core::ExecutionId;
use rootcause::prelude::Report;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Stale heap entries tolerated before the heap is rebuilt.
const COMPACT_SLACK: usize = 64;

/// A pending wake-up in the engine's index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingFire {
    /// Trigger name.
    pub name: String,
    /// Trigger kind.
    pub kind: TriggerKind,
    /// When the trigger will fire next.
    pub next_fire_at: DateTime<Utc>,
}

enum Control {
    Schedule {
        trigger: Trigger,
        reply: oneshot::Sender<bool>,
    },
    Cancel {
        name: String,
        reply: oneshot::Sender<Option<Trigger>>,
    },
    PurgeHistory {
        name: String,
        reply: oneshot::Sender<usize>,
    },
    Pending {
        reply: oneshot::Sender<Vec<PendingFire>>,
    },
    Shutdown,
}

/// Handle for sending control messages to a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Control>,
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schedule { trigger, .. } => write!(f, "Schedule({})", trigger.name),
            Self::Cancel { name, .. } => write!(f, "Cancel({name})"),
            Self::PurgeHistory { name, .. } => write!(f, "PurgeHistory({name})"),
            Self::Pending { .. } => write!(f, "Pending"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Control,
    ) -> Result<T, TriggerError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| TriggerError::EngineUnavailable)?;
        response.await.map_err(|_| TriggerError::EngineUnavailable)
    }

    /// Adds a trigger to the pending-fire index at its `next_fire_at`.
    ///
    /// Returns `false` without scheduling anything for manual triggers.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` if the engine has stopped.
    pub async fn schedule(&self, trigger: Trigger) -> Result<bool, TriggerError> {
        self.request(|reply| Control::Schedule { trigger, reply })
            .await
    }

    /// Removes a trigger from the pending-fire index.
    ///
    /// A firing already dispatched completes; no later one starts. Returns
    /// the trigger if it was pending, with `next_fire_at` set to the due time
    /// it was waiting for, so it can be handed back to [`Self::schedule`].
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` if the engine has stopped.
    pub async fn cancel(&self, name: &str) -> Result<Option<Trigger>, TriggerError> {
        let name = name.to_string();
        self.request(|reply| Control::Cancel { name, reply }).await
    }

    /// Deletes the execution records of a cancelled trigger's firings that
    /// are still running, as each one completes. Returns how many are
    /// running.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` if the engine has stopped.
    pub async fn purge_history(&self, name: &str) -> Result<usize, TriggerError> {
        let name = name.to_string();
        self.request(|reply| Control::PurgeHistory { name, reply })
            .await
    }

    /// Returns the pending-fire index in firing order.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` if the engine has stopped.
    pub async fn pending(&self) -> Result<Vec<PendingFire>, TriggerError> {
        self.request(|reply| Control::Pending { reply }).await
    }

    /// Asks the engine to stop. In-flight dispatches are awaited by the
    /// engine task before it exits.
    pub async fn shutdown(&self) {
        // Already stopped if the send fails.
        let _ = self.tx.send(Control::Shutdown).await;
    }

    /// Returns whether the engine task is still accepting messages.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    due: DateTime<Utc>,
    seq: u64,
    generation: u64,
    name: String,
}

#[derive(Debug)]
struct PendingEntry {
    trigger: Trigger,
    due: DateTime<Utc>,
    seq: u64,
    generation: u64,
}

#[derive(Debug)]
struct InFlight {
    name: String,
    count: usize,
    terminal: bool,
    // Removed or replaced; completions no longer touch the store.
    cancelled: bool,
    // Records written by these firings are deleted on completion.
    purge: bool,
}

#[derive(Debug)]
struct Completion {
    generation: u64,
    execution: ExecutionId,
}

/// The timer engine. Constructed and driven by [`TimerEngine::start`].
pub struct TimerEngine {
    store: Arc<dyn TriggerStore>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    queue: BinaryHeap<Reverse<QueueEntry>>,
    pending: HashMap<String, PendingEntry>,
    firing: HashMap<u64, InFlight>,
    in_flight: JoinSet<Completion>,
    permits: Arc<Semaphore>,
    next_seq: u64,
    next_generation: u64,
}

impl TimerEngine {
    /// Seeds the engine from `store` and spawns its loop.
    ///
    /// Returns once the pending-fire index has been rebuilt, so the schedule
    /// is observable through the handle immediately.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the store cannot be listed.
    pub async fn start(
        store: Arc<dyn TriggerStore>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Result<(EngineHandle, JoinHandle<()>), Report<TriggerError>> {
        let (tx, rx) = mpsc::channel(config.control_channel_capacity.max(1));
        let mut engine = Self {
            store,
            dispatcher,
            clock,
            permits: Arc::new(Semaphore::new(config.max_concurrent_dispatches.max(1))),
            config,
            queue: BinaryHeap::new(),
            pending: HashMap::new(),
            firing: HashMap::new(),
            in_flight: JoinSet::new(),
            next_seq: 0,
            next_generation: 0,
        };
        engine.seed().await.map_err(TriggerError::from)?;
        let task = tokio::spawn(engine.run(rx));
        Ok((EngineHandle { tx }, task))
    }

    async fn seed(&mut self) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut scheduled = 0usize;
        let mut dropped = 0usize;

        for trigger in self.store.list().await? {
            match startup_plan(&trigger, now, self.config.overdue_one_shot) {
                StartupPlan::Schedule(due) => {
                    if trigger.next_fire_at != Some(due) {
                        self.persist_next_fire(&trigger.name, due).await;
                    }
                    if trigger.status != TriggerStatus::Scheduled {
                        self.persist_status(&trigger.name, TriggerStatus::Scheduled)
                            .await;
                    }
                    self.insert(trigger, due);
                    scheduled += 1;
                }
                StartupPlan::Drop => {
                    info!(trigger = %trigger.name, "dropping one-shot trigger that came due during downtime");
                    self.persist_status(&trigger.name, TriggerStatus::Terminal)
                        .await;
                    dropped += 1;
                }
                StartupPlan::Skip => {}
            }
        }

        info!(scheduled, dropped, "timer engine seeded from store");
        Ok(())
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Control>) {
        info!(pending = self.pending.len(), "timer engine started");

        loop {
            // With every permit taken, only a completion can make progress.
            let wait = if self.permits.available_permits() == 0 {
                None
            } else {
                self.time_until_next_due()
            };
            let sleep = async move {
                match wait {
                    Some(duration) => tokio::time::sleep(duration).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                control = rx.recv() => match control {
                    Some(control) => {
                        if !self.handle(control) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(done) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.complete(done).await;
                }
                () = sleep => self.fire_due().await,
            }
        }

        while let Some(done) = self.in_flight.join_next().await {
            self.complete(done).await;
        }
        info!("timer engine stopped");
    }

    /// Applies a control message. Returns `false` on shutdown.
    fn handle(&mut self, control: Control) -> bool {
        debug!(?control, "timer engine control message");
        match control {
            Control::Schedule { trigger, reply } => {
                let accepted = match trigger.next_fire_at {
                    Some(due) if trigger.is_scheduled_kind() => {
                        self.insert(trigger, due);
                        true
                    }
                    _ => false,
                };
                let _ = reply.send(accepted);
            }
            Control::Cancel { name, reply } => {
                let cancelled = self.pending.remove(&name).map(|p| {
                    let mut trigger = p.trigger;
                    trigger.next_fire_at = Some(p.due);
                    trigger
                });
                self.cancel_in_flight(&name);
                self.compact();
                let _ = reply.send(cancelled);
            }
            Control::PurgeHistory { name, reply } => {
                let mut running = 0;
                for flight in self
                    .firing
                    .values_mut()
                    .filter(|f| f.cancelled && f.name == name)
                {
                    flight.purge = true;
                    running += flight.count;
                }
                let _ = reply.send(running);
            }
            Control::Pending { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Control::Shutdown => return false,
        }
        true
    }

    fn insert(&mut self, trigger: Trigger, due: DateTime<Utc>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let generation = self.next_generation;
        self.next_generation += 1;

        let name = trigger.name.clone();
        // A replaced incarnation's late completions must not touch this one.
        self.cancel_in_flight(&name);
        self.queue.push(Reverse(QueueEntry {
            due,
            seq,
            generation,
            name: name.clone(),
        }));
        self.pending.insert(
            name,
            PendingEntry {
                trigger,
                due,
                seq,
                generation,
            },
        );
    }

    fn cancel_in_flight(&mut self, name: &str) {
        for flight in self.firing.values_mut().filter(|f| f.name == name) {
            flight.cancelled = true;
        }
    }

    fn is_live(&self, entry: &QueueEntry) -> bool {
        is_live(&self.pending, entry)
    }

    fn time_until_next_due(&mut self) -> Option<Duration> {
        while let Some(Reverse(head)) = self.queue.peek() {
            if self.is_live(head) {
                break;
            }
            self.queue.pop();
        }
        let Reverse(head) = self.queue.peek()?;
        Some((head.due - self.clock.now()).to_std().unwrap_or(Duration::ZERO))
    }

    async fn fire_due(&mut self) {
        let now = self.clock.now();

        while self.queue.peek().is_some_and(|Reverse(head)| head.due <= now) {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                debug!("dispatch limit reached, due triggers wait for a running action");
                break;
            };
            let Some(Reverse(entry)) = self.queue.pop() else {
                break;
            };
            let Some(pending) = self.pending.get(&entry.name).filter(|_| self.is_live(&entry))
            else {
                continue;
            };

            let trigger = pending.trigger.clone();
            let seq = pending.seq;
            let generation = entry.generation;

            let (scheduled_for, terminal) = match trigger.schedule {
                TriggerSchedule::Recurring { interval } => {
                    let fire_at = latest_slot_at_or_before(entry.due, interval, now);
                    if fire_at > entry.due {
                        let skipped = (fire_at - entry.due).num_seconds() / interval.as_secs();
                        warn!(trigger = %entry.name, skipped, %fire_at, "recurring trigger fell behind, skipping missed slots");
                    }
                    let next = next_recurring_fire(fire_at, interval, now);
                    if let Some(pending) = self.pending.get_mut(&entry.name) {
                        pending.due = next;
                        pending.trigger.next_fire_at = Some(next);
                    }
                    self.queue.push(Reverse(QueueEntry {
                        due: next,
                        seq,
                        generation,
                        name: entry.name.clone(),
                    }));
                    self.persist_next_fire(&entry.name, next).await;
                    (fire_at, false)
                }
                TriggerSchedule::OneShot { .. } | TriggerSchedule::Manual => {
                    self.pending.remove(&entry.name);
                    (entry.due, true)
                }
            };

            self.firing
                .entry(generation)
                .or_insert_with(|| InFlight {
                    name: entry.name.clone(),
                    count: 0,
                    terminal,
                    cancelled: false,
                    purge: false,
                })
                .count += 1;

            self.persist_status(&entry.name, TriggerStatus::Firing)
                .await;
            self.spawn_dispatch(trigger, scheduled_for, generation, permit);
        }
    }

    fn spawn_dispatch(
        &mut self,
        trigger: Trigger,
        scheduled_for: DateTime<Utc>,
        generation: u64,
        permit: OwnedSemaphorePermit,
    ) {
        let dispatcher = self.dispatcher.clone();

        self.in_flight.spawn(async move {
            debug!(trigger = %trigger.name, %scheduled_for, "firing trigger");
            let record = dispatcher.fire(&trigger, Some(scheduled_for)).await;
            drop(permit);
            Completion {
                generation,
                execution: record.id,
            }
        });
    }

    async fn complete(&mut self, done: Result<Completion, JoinError>) {
        let completion = match done {
            Ok(completion) => completion,
            Err(e) => {
                error!(error = %e, "dispatch task failed");
                return;
            }
        };

        let Some(flight) = self.firing.get_mut(&completion.generation) else {
            return;
        };
        flight.count = flight.count.saturating_sub(1);
        let purge = flight.purge;
        let finished = flight.count == 0;

        if purge {
            self.dispatcher.discard(&completion.execution).await;
        }
        if !finished {
            return;
        }
        let Some(flight) = self.firing.remove(&completion.generation) else {
            return;
        };
        if flight.cancelled {
            return;
        }

        let status = if flight.terminal {
            TriggerStatus::Terminal
        } else {
            TriggerStatus::Scheduled
        };
        self.persist_status(&flight.name, status).await;
    }

    fn compact(&mut self) {
        if self.queue.len() > 2 * self.pending.len() + COMPACT_SLACK {
            let pending = &self.pending;
            self.queue.retain(|Reverse(entry)| is_live(pending, entry));
        }
    }

    fn snapshot(&self) -> Vec<PendingFire> {
        let mut entries: Vec<&PendingEntry> = self.pending.values().collect();
        entries.sort_by_key(|p| (p.due, p.seq));
        entries
            .into_iter()
            .map(|p| PendingFire {
                name: p.trigger.name.clone(),
                kind: p.trigger.kind(),
                next_fire_at: p.due,
            })
            .collect()
    }

    async fn persist_next_fire(&self, name: &str, at: DateTime<Utc>) {
        match self.store.update_next_fire(name, at).await {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => {
                debug!(trigger = name, "trigger removed before next fire time was stored");
            }
            Err(e) => warn!(trigger = name, error = %e, "failed to persist next fire time"),
        }
    }

    async fn persist_status(&self, name: &str, status: TriggerStatus) {
        match self.store.update_status(name, status).await {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => {
                debug!(trigger = name, %status, "trigger removed before status was stored");
            }
            Err(e) => {
                warn!(trigger = name, %status, error = %e, "failed to persist trigger status");
            }
        }
    }
}

fn is_live(pending: &HashMap<String, PendingEntry>, entry: &QueueEntry) -> bool {
    pending
        .get(&entry.name)
        .is_some_and(|p| p.generation == entry.generation && p.due == entry.due)
}
