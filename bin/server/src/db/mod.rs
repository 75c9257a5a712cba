//! Database repositories for event-triggers.
//!
//! This module provides PostgreSQL implementations of:
//! - The trigger store
//! - The execution log

pub mod execution;
pub mod trigger;

pub use execution::PgExecutionLog;
pub use trigger::PgTriggerStore;
