//! Classified, privacy-checked capture of CLI interactions.
//!
//! Re-exports the record model, configuration and collector:
//!
//! ```rust
//! use interlog::{CollectorConfig, InteractionCollector, InteractionStore, Outcome, ResultStatus};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InteractionStore::in_memory().unwrap());
//! let collector = InteractionCollector::new(store, &CollectorConfig::new()).unwrap();
//!
//! let id = collector.start("mcp list", Default::default(), None, None);
//! let result = collector.end(&id, Outcome::new(ResultStatus::SuccessPerfect, 0.8));
//! assert!(result.is_stored());
//! ```

pub use interlog_collector::*;
pub use interlog_config::{CollectorConfig, ConfigError};
pub use interlog_core::*;
