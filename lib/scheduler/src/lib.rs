//! Trigger scheduling engine.
//!
//! This crate provides:
//!
//! - **Trigger Store**: Durable trigger definitions, the source of truth
//! - **Execution Log**: Append-only history of firings
//! - **Timer Engine**: Pending-fire index and the single wait loop
//! - **Dispatcher**: Runs trigger actions and records their outcome
//! - **Registry**: Registration and control operations for callers

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod execution;
pub mod registry;
pub mod schedule;
pub mod store;
pub mod trigger;

pub use clock::{Clock, TokioClock};
pub use config::{LogRetention, OverduePolicy, SchedulerConfig};
pub use dispatcher::{Dispatcher, TriggerAction};
pub use engine::{EngineHandle, PendingFire, TimerEngine};
pub use error::{ActionError, StoreError, TriggerError};
pub use execution::{ExecutionLog, ExecutionRecord, InMemoryExecutionLog, Outcome};
pub use registry::TriggerRegistry;
pub use store::{InMemoryTriggerStore, TriggerStore};
pub use trigger::{
    Period, RegisterTrigger, Trigger, TriggerKind, TriggerSchedule, TriggerStatus,
};
