//! Error handling foundation for event-triggers.
//!
//! Only the `Result` alias lives here. Each crate owns its domain error
//! enums and wraps them in a rootcause [`Report`] at its public boundary,
//! so callers get both the typed variant (via `current_context`) and any
//! context attached on the way up.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
