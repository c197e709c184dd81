//! Capture, classification and persistence of CLI interactions.
//!
//! An [`InteractionCollector`] owns one session. `start` classifies the
//! command and buffers it as open; `end` merges the outcome, derives the
//! learning value, validates, anonymizes and stores the record.

pub mod classifier;
mod collector;
mod environment;
pub mod privacy;
mod snapshot;
mod store;

pub use collector::{CollectorError, EndOutcome, InteractionCollector};
pub use environment::{EnvironmentProbe, FixedEnvironment, HostEnvironment};
pub use privacy::{SensitivePattern, ValidationFailure};
pub use snapshot::{DrainReport, SnapshotError, SnapshotWorker, SnapshotWriter};
pub use store::{InteractionQuery, InteractionStore, SessionStats, StoreError};
