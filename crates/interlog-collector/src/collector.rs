//! Session-scoped collector that classifies, validates and persists interactions.

use crate::classifier;
use crate::environment::{EnvironmentProbe, HostEnvironment};
use crate::privacy::{self, ValidationFailure};
use crate::snapshot::{DrainReport, SnapshotError, SnapshotWorker, SnapshotWriter};
use crate::store::{InteractionQuery, InteractionStore, SessionStats, StoreError};
use chrono::{SubsecRound, Utc};
use interlog_config::{CollectorConfig, ConfigError};
use interlog_core::{InteractionRecord, JsonMap, LearningValue, OpenInteraction, Outcome};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("snapshot_dir is set but the store was opened without a snapshot outbox")]
    OutboxDisabled,
}

/// What happened to an interaction passed to [`InteractionCollector::end`].
#[derive(Debug, Clone, PartialEq)]
pub enum EndOutcome {
    /// Validated, anonymized and persisted.
    Stored { learning_value: LearningValue },
    /// Failed validation and was discarded.
    Rejected(ValidationFailure),
    /// Passed validation but the relational write failed; the record is gone.
    StoreFailed(String),
    /// No open interaction had this id.
    UnknownRecord,
}

impl EndOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, EndOutcome::Stored { .. })
    }
}

struct Snapshots {
    writer: SnapshotWriter,
    worker: SnapshotWorker,
    batch_size: usize,
}

/// Collector for one session of CLI interactions.
///
/// Open interactions are held in memory keyed by id until `end` closes them.
/// The buffer is bounded by `buffer_capacity` and entries older than
/// `open_ttl_secs` are evicted on the next `start`.
pub struct InteractionCollector {
    session_id: String,
    store: Arc<InteractionStore>,
    environment: Box<dyn EnvironmentProbe>,
    open: Mutex<HashMap<String, OpenInteraction>>,
    capacity: usize,
    open_ttl: Duration,
    snapshots: Option<Snapshots>,
}

impl InteractionCollector {
    /// Opens the store described by `config` and starts a collector on it.
    pub fn open(config: &CollectorConfig) -> Result<Self, CollectorError> {
        config.validate()?;
        let mut store = InteractionStore::new(&config.database_path)?;
        if config.snapshot_dir.is_some() {
            store = store.with_snapshot_outbox();
        }
        Self::new(Arc::new(store), config)
    }

    /// Starts a new session on an existing store.
    pub fn new(
        store: Arc<InteractionStore>,
        config: &CollectorConfig,
    ) -> Result<Self, CollectorError> {
        config.validate()?;

        let snapshots = match &config.snapshot_dir {
            Some(dir) => {
                if !store.outbox_enabled() {
                    return Err(CollectorError::OutboxDisabled);
                }
                let writer = SnapshotWriter::new(dir);
                let worker = SnapshotWorker::spawn(
                    store.clone(),
                    writer.clone(),
                    config.snapshot_batch_size,
                    Duration::from_millis(config.snapshot_poll_ms),
                )?;
                Some(Snapshots {
                    writer,
                    worker,
                    batch_size: config.snapshot_batch_size,
                })
            }
            None => None,
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session_id = %session_id, "Interaction collector started");

        Ok(Self {
            session_id,
            store,
            environment: Box::new(HostEnvironment),
            open: Mutex::new(HashMap::new()),
            capacity: config.buffer_capacity,
            open_ttl: Duration::from_secs(config.open_ttl_secs),
            snapshots,
        })
    }

    /// Replaces the host environment probe.
    pub fn with_environment(mut self, probe: impl EnvironmentProbe + 'static) -> Self {
        self.environment = Box::new(probe);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn store(&self) -> &Arc<InteractionStore> {
        &self.store
    }

    // Every buffer mutation is a single insert or remove, so the map is
    // consistent even if a holder panicked.
    fn buffer(&self) -> MutexGuard<'_, HashMap<String, OpenInteraction>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens an interaction and returns its id.
    pub fn start(
        &self,
        command: impl Into<String>,
        arguments: JsonMap,
        context: Option<JsonMap>,
        user_id: Option<String>,
    ) -> String {
        let command = command.into();
        let context = context.unwrap_or_default();

        let task_type = classifier::classify_task_type(&command, &arguments);
        let interaction = OpenInteraction {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: self.session_id.clone(),
            timestamp: Utc::now().trunc_subsecs(6),
            subcategory: classifier::classify_subcategory(task_type, &command, &arguments),
            complexity: classifier::assess_complexity(&command, &arguments, &context),
            task_type,
            command,
            arguments,
            context,
            user_identifier: user_id,
            environment_info: self.environment.capture(),
        };
        let id = interaction.id.clone();

        tracing::debug!(
            record_id = %id,
            task_type = %interaction.task_type,
            complexity = %interaction.complexity,
            "Opened interaction"
        );

        let mut buffer = self.buffer();
        self.evict_stale_locked(&mut buffer);
        if buffer.len() >= self.capacity {
            let oldest = buffer
                .values()
                .min_by_key(|o| o.timestamp)
                .map(|o| o.id.clone());
            if let Some(oldest) = oldest {
                buffer.remove(&oldest);
                tracing::warn!(record_id = %oldest, capacity = self.capacity, "Buffer full, evicted oldest open interaction");
            }
        }
        buffer.insert(id.clone(), interaction);

        id
    }

    /// Closes an interaction: classify, validate, anonymize, persist.
    ///
    /// The interaction leaves the buffer whatever the result.
    pub fn end(&self, id: &str, outcome: Outcome) -> EndOutcome {
        let Some(open) = self.buffer().remove(id) else {
            tracing::warn!(record_id = %id, "end called for unknown interaction");
            return EndOutcome::UnknownRecord;
        };

        let learning_value = classifier::assess_outcome(&open, &outcome);
        let record = open.close(outcome, learning_value);

        if let Err(reason) = privacy::validate(&record) {
            tracing::warn!(record_id = %id, "Discarded invalid interaction: {}", reason);
            return EndOutcome::Rejected(reason);
        }

        let record = privacy::anonymize(record);
        if let Err(e) = self.store.store(&record) {
            tracing::error!(record_id = %id, "Failed to store interaction: {}", e);
            return EndOutcome::StoreFailed(e.to_string());
        }

        tracing::debug!(record_id = %id, learning_value = %learning_value, "Stored interaction");
        if let Some(snapshots) = &self.snapshots {
            snapshots.worker.wake();
        }
        EndOutcome::Stored { learning_value }
    }

    pub fn open_count(&self) -> usize {
        self.buffer().len()
    }

    /// Drops open interactions older than the configured TTL.
    pub fn evict_stale(&self) -> usize {
        let mut buffer = self.buffer();
        self.evict_stale_locked(&mut buffer)
    }

    fn evict_stale_locked(&self, buffer: &mut HashMap<String, OpenInteraction>) -> usize {
        let now = Utc::now();
        let before = buffer.len();
        buffer.retain(|id, open| {
            let age = now
                .signed_duration_since(open.timestamp)
                .to_std()
                .unwrap_or_default();
            let keep = age <= self.open_ttl;
            if !keep {
                tracing::warn!(record_id = %id, age_secs = age.as_secs(), "Evicted stale open interaction");
            }
            keep
        });
        before - buffer.len()
    }

    pub fn query(&self, query: &InteractionQuery) -> Result<Vec<InteractionRecord>, StoreError> {
        self.store.query(query)
    }

    /// Aggregates over every record this session has stored.
    pub fn session_stats(&self) -> Result<SessionStats, StoreError> {
        self.store.session_stats(&self.session_id)
    }

    /// Writes any queued snapshots on the calling thread.
    pub fn flush_snapshots(&self) -> Result<DrainReport, SnapshotError> {
        match &self.snapshots {
            Some(s) => s.writer.drain(&self.store, s.batch_size),
            None => Ok(DrainReport::default()),
        }
    }
}
