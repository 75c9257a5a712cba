//! event-triggers server.
//!
//! This crate wires the trigger scheduler to PostgreSQL and exposes its
//! control surface as JSON over HTTP.

pub mod action;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
