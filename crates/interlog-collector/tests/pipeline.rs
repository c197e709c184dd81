use interlog_collector::{
    EndOutcome, FixedEnvironment, InteractionCollector, InteractionQuery, ValidationFailure,
};
use interlog_config::CollectorConfig;
use interlog_core::{JsonMap, LearningValue, Outcome, ResultStatus, TaskType};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn map(value: serde_json::Value) -> JsonMap {
    value.as_object().cloned().unwrap_or_default()
}

fn file_collector(dir: &TempDir, snapshots: bool) -> InteractionCollector {
    let mut config =
        CollectorConfig::new().with_database_path(dir.path().join("db/interactions.db"));
    if snapshots {
        config = config.with_snapshot_dir(dir.path().join("snapshots"));
    }
    InteractionCollector::open(&config)
        .unwrap()
        .with_environment(FixedEnvironment(map(json!({
            "platform": "linux",
            "hostname": "ci-runner",
            "ip_address": "172.16.0.4",
            "working_directory": "/srv/app"
        }))))
}

#[test]
fn gaia_run_is_classified_and_scored_high() {
    let dir = TempDir::new().unwrap();
    let collector = file_collector(&dir, false);

    let id = collector.start(
        "gaia --level 1 --max-tasks 5",
        map(json!({"level": 1, "max-tasks": 5})),
        None,
        None,
    );
    let outcome = Outcome::new(ResultStatus::SuccessPartial, 45.2)
        .with_output(map(json!({"solved": 3, "attempted": 5})))
        .with_tools(["claude_mcp", "gemini_mcp"])
        .with_accuracy(0.6);

    assert_eq!(
        collector.end(&id, outcome),
        EndOutcome::Stored { learning_value: LearningValue::High }
    );

    let results = collector
        .query(&InteractionQuery::new().task_type(TaskType::GaiaTesting))
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, id);
    assert_eq!(results[0].subcategory, "level_evaluation");

    let training = collector.query(&InteractionQuery::training_candidates()).unwrap();
    assert_eq!(training.len(), 1);
}

#[test]
fn record_with_email_never_persisted() {
    let dir = TempDir::new().unwrap();
    let collector = file_collector(&dir, false);

    let id = collector.start("run task for user@example.com", JsonMap::new(), None, None);
    let result = collector.end(&id, Outcome::new(ResultStatus::SuccessPerfect, 3.0));

    assert!(matches!(result, EndOutcome::Rejected(ValidationFailure::SensitiveData(_))));
    assert!(collector.query(&InteractionQuery::new()).unwrap().is_empty());
    assert_eq!(collector.open_count(), 0);
}

#[test]
fn concurrent_sessions_lose_nothing() {
    let dir = TempDir::new().unwrap();
    let collector = Arc::new(file_collector(&dir, false));

    let handles: Vec<_> = ["mcp list adapters", "analyze data report"]
        .into_iter()
        .map(|command| {
            let collector = collector.clone();
            thread::spawn(move || collector.start(command, JsonMap::new(), None, None))
        })
        .collect();
    let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_ne!(ids[0], ids[1]);
    assert_eq!(collector.open_count(), 2);

    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let collector = collector.clone();
            thread::spawn(move || {
                collector.end(&id, Outcome::new(ResultStatus::SuccessAcceptable, 0.5))
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().is_stored());
    }

    assert_eq!(collector.open_count(), 0);
    assert_eq!(collector.session_stats().unwrap().total, 2);
}

#[test]
fn snapshots_mirror_stored_records() {
    let dir = TempDir::new().unwrap();
    let collector = file_collector(&dir, true);

    let id = collector.start("mcp install claude", JsonMap::new(), None, Some("bob".into()));
    assert!(collector
        .end(&id, Outcome::new(ResultStatus::SuccessPerfect, 2.5))
        .is_stored());
    collector.flush_snapshots().unwrap();

    let record = collector.store().get(&id).unwrap().unwrap();
    let path = dir
        .path()
        .join("snapshots")
        .join(record.timestamp.format("%Y-%m-%d").to_string())
        .join("mcp_management")
        .join(format!("{id}.json"));
    let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();

    assert_eq!(doc["id"], json!(id));
    assert_eq!(doc["task_type"], json!("mcp_management"));
    assert_eq!(doc["environment_info"]["hostname"], json!("anonymized"));
    assert!(doc["environment_info"].get("ip_address").is_none());
    assert_ne!(doc["user_identifier"], json!("bob"));
    assert_eq!(collector.store().pending_snapshot_count().unwrap(), 0);
}

#[test]
fn reopened_store_keeps_records() {
    let dir = TempDir::new().unwrap();
    let id = {
        let collector = file_collector(&dir, false);
        let id = collector.start("status", JsonMap::new(), None, None);
        collector.end(&id, Outcome::new(ResultStatus::FailureResource, 0.1));
        id
    };

    let collector = file_collector(&dir, false);
    let record = collector.store().get(&id).unwrap().unwrap();
    assert_eq!(record.result_status, ResultStatus::FailureResource);
    assert_eq!(record.learning_value, LearningValue::Negative);
    // a new collector is a new session
    assert_eq!(collector.session_stats().unwrap().total, 0);
}
