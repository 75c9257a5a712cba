//! Core types and utilities for event-triggers.
//!
//! This crate provides the error-handling foundation and strongly typed
//! identifiers shared by the scheduler library and the server binary.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ExecutionId, ParseIdError};
