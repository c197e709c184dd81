//! Core domain types for interlog.
//!
//! This crate holds the interaction record model shared by the rest of the
//! workspace:
//!
//! - [`OpenInteraction`] — a started interaction awaiting its outcome
//! - [`Outcome`] — the data supplied when an interaction ends
//! - [`InteractionRecord`] — the closed record that gets persisted
//! - [`TaskType`], [`ComplexityLevel`], [`ResultStatus`], [`LearningValue`]
//!
//! # Example
//!
//! ```rust
//! use interlog_core::{Outcome, ResultStatus};
//!
//! let outcome = Outcome::new(ResultStatus::SuccessPartial, 45.2)
//!     .with_tools(["claude_mcp", "gemini_mcp"])
//!     .with_accuracy(0.6);
//!
//! assert_eq!(outcome.tools_used.len(), 2);
//! ```

mod record;

pub use record::{
    ComplexityLevel, InteractionRecord, JsonMap, LearningValue, OpenInteraction, Outcome,
    ResultStatus, TaskType, UnknownVariant,
};
