//! Keyword and weight based classification of interactions.
//!
//! Every function here is pure: same inputs, same answer, no I/O.

use interlog_core::{
    ComplexityLevel, InteractionRecord, JsonMap, LearningValue, OpenInteraction, Outcome,
    ResultStatus, TaskType,
};
use serde_json::Value;
use std::collections::HashSet;

pub const DEFAULT_SUBCATEGORY: &str = "general";

const GAIA_KEYWORDS: &[&str] = &["gaia", "benchmark", "level", "evaluate", "leaderboard"];
const MCP_KEYWORDS: &[&str] = &["mcp", "adapter", "server", "register", "protocol", "connect"];
const DATA_KEYWORDS: &[&str] = &[
    "analyze", "analysis", "data", "report", "stats", "statistics", "csv", "chart", "dataset",
];
const CODE_KEYWORDS: &[&str] = &[
    "code", "generate", "function", "class", "implement", "refactor", "script", "compile",
];
const SYSTEM_KEYWORDS: &[&str] = &[
    "system", "status", "config", "install", "update", "restart", "health", "monitor",
];

const GAIA_SUBCATEGORIES: &[(&str, &[&str])] = &[
    ("level_evaluation", &["level"]),
    ("batch_run", &["max-tasks", "batch", "all"]),
    ("accuracy_review", &["accuracy", "score", "evaluate"]),
];
const MCP_SUBCATEGORIES: &[(&str, &[&str])] = &[
    ("adapter_setup", &["install", "register", "add", "setup"]),
    ("adapter_query", &["list", "status", "info", "search"]),
    ("adapter_removal", &["remove", "delete", "unregister"]),
];
const DATA_SUBCATEGORIES: &[(&str, &[&str])] = &[
    ("statistics", &["stats", "statistics", "summary"]),
    ("visualization", &["chart", "plot", "graph"]),
    ("reporting", &["report", "export"]),
];
const CODE_SUBCATEGORIES: &[(&str, &[&str])] = &[
    ("refactoring", &["refactor", "cleanup"]),
    ("testing", &["test", "unit"]),
    ("scaffolding", &["generate", "create", "scaffold"]),
];

/// Argument keys that indicate a heavier invocation.
const COMPLEX_ARGUMENT_PATTERNS: &[&str] = &[
    "config", "filter", "parallel", "batch", "recursive", "pipeline", "timeout", "retries",
    "workers", "depth", "model", "output",
];

fn keywords(task_type: TaskType) -> &'static [&'static str] {
    match task_type {
        TaskType::GaiaTesting => GAIA_KEYWORDS,
        TaskType::McpManagement => MCP_KEYWORDS,
        TaskType::DataAnalysis => DATA_KEYWORDS,
        TaskType::CodeGeneration => CODE_KEYWORDS,
        TaskType::SystemOperation => SYSTEM_KEYWORDS,
    }
}

fn subcategories(task_type: TaskType) -> &'static [(&'static str, &'static [&'static str])] {
    match task_type {
        TaskType::GaiaTesting => GAIA_SUBCATEGORIES,
        TaskType::McpManagement => MCP_SUBCATEGORIES,
        TaskType::DataAnalysis => DATA_SUBCATEGORIES,
        TaskType::CodeGeneration => CODE_SUBCATEGORIES,
        TaskType::SystemOperation => &[],
    }
}

/// Lowercased command followed by the stringified argument values.
fn search_text(command: &str, arguments: &JsonMap) -> String {
    let values: Vec<String> = arguments
        .values()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    format!("{} {}", command, values.join(" ")).to_lowercase()
}

pub fn classify_task_type(command: &str, arguments: &JsonMap) -> TaskType {
    let text = search_text(command, arguments);

    let mut best = TaskType::SystemOperation;
    let mut best_score = 0;
    for task_type in TaskType::ALL {
        let score: usize = keywords(task_type)
            .iter()
            .map(|kw| text.matches(kw).count())
            .sum();
        // Strict comparison keeps the first-declared type on ties.
        if score > best_score {
            best = task_type;
            best_score = score;
        }
    }
    best
}

/// Whole tokens of `text`; leading dashes of flags are dropped.
fn tokens(text: &str) -> HashSet<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .map(|t| t.trim_start_matches('-'))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Subcategory keywords match whole tokens, so `all` does not fire on `install`.
pub fn classify_subcategory(task_type: TaskType, command: &str, arguments: &JsonMap) -> String {
    let text = search_text(command, arguments);
    let tokens = tokens(&text);
    subcategories(task_type)
        .iter()
        .find(|(_, kws)| kws.iter().any(|kw| tokens.contains(kw)))
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| DEFAULT_SUBCATEGORY.to_string())
}

/// Whitespace-separated tokens containing at least one letter.
fn word_count(command: &str) -> usize {
    command
        .split_whitespace()
        .filter(|w| w.chars().any(char::is_alphabetic))
        .count()
}

/// Complexity in tenths of a point. Every weight is a whole number of tenths,
/// so threshold comparisons are exact.
fn complexity_tenths(command: &str, arguments: &JsonMap, context: &JsonMap) -> usize {
    let complex_args = arguments
        .keys()
        .filter(|key| {
            let key = key.to_lowercase();
            COMPLEX_ARGUMENT_PATTERNS.iter().any(|p| key.contains(p))
        })
        .count();

    3 * arguments.len() + 2 * word_count(command) + context.len() + 4 * complex_args
}

pub fn complexity_score(command: &str, arguments: &JsonMap, context: &JsonMap) -> f64 {
    complexity_tenths(command, arguments, context) as f64 / 10.0
}

pub fn assess_complexity(
    command: &str,
    arguments: &JsonMap,
    context: &JsonMap,
) -> ComplexityLevel {
    match complexity_tenths(command, arguments, context) {
        0..=10 => ComplexityLevel::Simple,
        11..=30 => ComplexityLevel::Moderate,
        31..=60 => ComplexityLevel::Complex,
        _ => ComplexityLevel::Expert,
    }
}

// Learning weights are in tenths of a point.

fn base_weight(task_type: TaskType) -> i32 {
    match task_type {
        TaskType::GaiaTesting => 4,
        TaskType::McpManagement | TaskType::DataAnalysis => 3,
        TaskType::CodeGeneration | TaskType::SystemOperation => 0,
    }
}

fn complexity_weight(complexity: ComplexityLevel) -> i32 {
    match complexity {
        ComplexityLevel::Simple => 1,
        ComplexityLevel::Moderate => 3,
        ComplexityLevel::Complex => 5,
        ComplexityLevel::Expert => 7,
    }
}

fn outcome_adjustment(status: ResultStatus) -> i32 {
    match status {
        ResultStatus::SuccessPerfect | ResultStatus::SuccessPartial => 3,
        ResultStatus::SuccessAcceptable => 1,
        ResultStatus::FailureUser
        | ResultStatus::FailureSystem
        | ResultStatus::FailureConfig
        | ResultStatus::FailureResource => -2,
    }
}

fn learning_tenths(
    task_type: TaskType,
    complexity: ComplexityLevel,
    status: ResultStatus,
    accuracy_score: Option<f64>,
    tool_count: usize,
) -> f64 {
    let tools_bonus = if tool_count > 1 { 2 } else { 0 };
    let fixed = base_weight(task_type)
        + complexity_weight(complexity)
        + outcome_adjustment(status)
        + tools_bonus;
    // Only the accuracy term is fractional; rounding keeps exact inputs like 0.5 on the threshold.
    let accuracy = (accuracy_score.unwrap_or(0.0) * 2.0 * 1e9).round() / 1e9;
    f64::from(fixed) + accuracy
}

/// Unclipped learning score.
pub fn learning_score(
    task_type: TaskType,
    complexity: ComplexityLevel,
    status: ResultStatus,
    accuracy_score: Option<f64>,
    tool_count: usize,
) -> f64 {
    learning_tenths(task_type, complexity, status, accuracy_score, tool_count) / 10.0
}

fn bucket_learning_value(tenths: f64) -> LearningValue {
    if tenths >= 8.0 {
        LearningValue::High
    } else if tenths >= 5.0 {
        LearningValue::Medium
    } else if tenths >= 2.0 {
        LearningValue::Low
    } else {
        LearningValue::Negative
    }
}

pub fn assess_learning_value(record: &InteractionRecord) -> LearningValue {
    bucket_learning_value(learning_tenths(
        record.task_type,
        record.complexity,
        record.result_status,
        record.accuracy_score,
        record.tools_used.len(),
    ))
}

/// Learning value of the record that `open` would become once closed with `outcome`.
pub fn assess_outcome(open: &OpenInteraction, outcome: &Outcome) -> LearningValue {
    bucket_learning_value(learning_tenths(
        open.task_type,
        open.complexity,
        outcome.result_status,
        outcome.accuracy_score,
        outcome.tools_used.len(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn open(task_type: TaskType, complexity: ComplexityLevel) -> OpenInteraction {
        OpenInteraction {
            id: "rec".to_string(),
            session_id: "sess".to_string(),
            timestamp: chrono::Utc::now(),
            command: "cmd".to_string(),
            arguments: JsonMap::new(),
            context: JsonMap::new(),
            task_type,
            subcategory: DEFAULT_SUBCATEGORY.to_string(),
            complexity,
            user_identifier: None,
            environment_info: JsonMap::new(),
        }
    }

    #[test]
    fn test_gaia_command_classified() {
        let a = args(json!({"level": 1, "max-tasks": 5}));
        let command = "gaia --level 1 --max-tasks 5";
        assert_eq!(classify_task_type(command, &a), TaskType::GaiaTesting);
        assert_eq!(classify_subcategory(TaskType::GaiaTesting, command, &a), "level_evaluation");
    }

    #[test]
    fn test_no_keywords_defaults_to_system_operation() {
        let task = classify_task_type("run task for someone", &JsonMap::new());
        assert_eq!(task, TaskType::SystemOperation);
    }

    #[test]
    fn test_argument_values_count_toward_score() {
        let a = args(json!({"target": "Dataset.CSV"}));
        assert_eq!(classify_task_type("open", &a), TaskType::DataAnalysis);
    }

    #[test]
    fn test_ties_go_to_first_declared_type() {
        // one MCP keyword, one DATA keyword
        let task = classify_task_type("mcp data", &JsonMap::new());
        assert_eq!(task, TaskType::McpManagement);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let a = args(json!({"file": "report.csv", "depth": 3}));
        let first = classify_task_type("analyze code", &a);
        for _ in 0..10 {
            assert_eq!(classify_task_type("analyze code", &a), first);
        }
    }

    #[test]
    fn test_subcategory_defaults() {
        let empty = JsonMap::new();
        assert_eq!(classify_subcategory(TaskType::SystemOperation, "status", &empty), "general");
        assert_eq!(classify_subcategory(TaskType::McpManagement, "mcp", &empty), "general");
        assert_eq!(
            classify_subcategory(TaskType::McpManagement, "mcp remove claude", &empty),
            "adapter_removal"
        );
    }

    #[test]
    fn test_subcategory_matches_whole_tokens() {
        let empty = JsonMap::new();
        for (task_type, command) in [
            (TaskType::GaiaTesting, "gaia install"),
            (TaskType::McpManagement, "mcp padding"),
            (TaskType::CodeGeneration, "code community"),
        ] {
            assert_eq!(classify_subcategory(task_type, command, &empty), "general");
        }
        assert_eq!(
            classify_subcategory(TaskType::GaiaTesting, "gaia --max-tasks 20", &empty),
            "batch_run"
        );
        assert_eq!(
            classify_subcategory(TaskType::CodeGeneration, "code unit tests", &empty),
            "testing"
        );
        let a = args(json!({"action": "add"}));
        assert_eq!(classify_subcategory(TaskType::McpManagement, "mcp", &a), "adapter_setup");
    }

    #[test]
    fn test_word_count_skips_numbers() {
        assert_eq!(word_count("gaia --level 1 --max-tasks 5"), 3);
        assert_eq!(word_count("   "), 0);
    }

    #[test]
    fn test_complexity_thresholds() {
        let empty = JsonMap::new();
        assert_eq!(assess_complexity("status", &empty, &empty), ComplexityLevel::Simple);

        let a = args(json!({"level": 1, "max-tasks": 5}));
        let score = complexity_score("gaia --level 1 --max-tasks 5", &a, &empty);
        assert!((score - 1.2).abs() < 1e-9);
        assert_eq!(
            assess_complexity("gaia --level 1 --max-tasks 5", &a, &empty),
            ComplexityLevel::Moderate
        );

        let heavy = args(json!({
            "config": "a", "filter": "b", "parallel": true, "batch": 10,
            "workers": 4, "timeout": 30, "depth": 2, "retries": 3, "output": "out.json"
        }));
        assert_eq!(
            assess_complexity("pipeline run nightly job", &heavy, &empty),
            ComplexityLevel::Expert
        );
    }

    #[test]
    fn test_complexity_exact_boundaries() {
        let one_ctx = args(json!({"cwd": "/"}));
        let two_ctx = args(json!({"cwd": "/", "shell": "bash"}));
        let three_ctx = args(json!({"cwd": "/", "shell": "bash", "term": "xterm"}));
        let four_ctx = args(json!({"cwd": "/", "shell": "bash", "term": "xterm", "lang": "C"}));

        // 0.3 + 0.6 + 0.1 = 1.0
        let a = args(json!({"name": "x"}));
        assert_eq!(complexity_score("run the job", &a, &one_ctx), 1.0);
        assert_eq!(assess_complexity("run the job", &a, &one_ctx), ComplexityLevel::Simple);
        assert_eq!(assess_complexity("run the job", &a, &two_ctx), ComplexityLevel::Moderate);

        // 0.6 + 2.2 + 0.2 = 3.0
        let a = args(json!({"alpha": 1, "beta": 2}));
        let command = "a b c d e f g h i j k";
        assert_eq!(complexity_score(command, &a, &two_ctx), 3.0);
        assert_eq!(assess_complexity(command, &a, &two_ctx), ComplexityLevel::Moderate);
        assert_eq!(assess_complexity(command, &a, &three_ctx), ComplexityLevel::Complex);

        // 2.1 + 1.2 + 0.3 + 2.4 = 6.0
        let a = args(json!({
            "config": 1, "filter": 2, "parallel": 3, "batch": 4,
            "workers": 5, "timeout": 6, "alpha": 7
        }));
        let command = "one two three four five six";
        assert_eq!(complexity_score(command, &a, &three_ctx), 6.0);
        assert_eq!(assess_complexity(command, &a, &three_ctx), ComplexityLevel::Complex);
        assert_eq!(assess_complexity(command, &a, &four_ctx), ComplexityLevel::Expert);
    }

    #[test]
    fn test_complexity_non_decreasing_in_argument_count() {
        let context = args(json!({"cwd": "/tmp"}));
        let mut a = JsonMap::new();
        let mut previous = complexity_score("run job", &a, &context);
        for (i, key) in ["alpha", "config", "beta", "workers", "gamma"].iter().enumerate() {
            a.insert(key.to_string(), json!(i));
            let score = complexity_score("run job", &a, &context);
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn test_learning_value_worked_example() {
        let outcome = Outcome::new(ResultStatus::SuccessPartial, 45.2)
            .with_tools(["claude_mcp", "gemini_mcp"])
            .with_accuracy(0.6);
        let o = open(TaskType::GaiaTesting, ComplexityLevel::Moderate);

        let score = learning_score(
            o.task_type,
            o.complexity,
            outcome.result_status,
            outcome.accuracy_score,
            outcome.tools_used.len(),
        );
        assert!((score - 1.32).abs() < 1e-9);
        assert_eq!(assess_outcome(&o, &outcome), LearningValue::High);
    }

    #[test]
    fn test_learning_value_buckets() {
        let o = open(TaskType::SystemOperation, ComplexityLevel::Simple);
        // 0.0 + 0.1 - 0.2 = -0.1
        let failed = Outcome::new(ResultStatus::FailureSystem, 1.0);
        assert_eq!(assess_outcome(&o, &failed), LearningValue::Negative);
        // 0.0 + 0.1 + 0.1 = 0.2
        let ok = Outcome::new(ResultStatus::SuccessAcceptable, 1.0);
        assert_eq!(assess_outcome(&o, &ok), LearningValue::Low);

        let o = open(TaskType::DataAnalysis, ComplexityLevel::Simple);
        // 0.3 + 0.1 + 0.3 = 0.7
        let perfect = Outcome::new(ResultStatus::SuccessPerfect, 1.0);
        assert_eq!(assess_outcome(&o, &perfect), LearningValue::Medium);
    }

    #[test]
    fn test_learning_value_exact_boundaries() {
        let two_tools = |status| Outcome::new(status, 1.0).with_tools(["a", "b"]);

        // 0.4 + 0.3 + 0.1 = 0.8
        let o = open(TaskType::GaiaTesting, ComplexityLevel::Moderate);
        let acceptable = Outcome::new(ResultStatus::SuccessAcceptable, 1.0);
        assert_eq!(assess_outcome(&o, &acceptable), LearningValue::High);
        // 0.0 + 0.7 + 0.1 = 0.8
        let o = open(TaskType::CodeGeneration, ComplexityLevel::Expert);
        assert_eq!(assess_outcome(&o, &acceptable), LearningValue::High);
        // 0.0 + 0.5 + 0.1 + 1.0 * 0.2 = 0.8
        let o = open(TaskType::SystemOperation, ComplexityLevel::Complex);
        assert_eq!(assess_outcome(&o, &acceptable.clone().with_accuracy(1.0)), LearningValue::High);

        // 0.4 + 0.1 - 0.2 + 0.2 = 0.5
        let o = open(TaskType::GaiaTesting, ComplexityLevel::Simple);
        let failed = two_tools(ResultStatus::FailureUser);
        assert_eq!(assess_outcome(&o, &failed), LearningValue::Medium);
        // 0.3 + 0.1 - 0.2 + 0.95 * 0.2 = 0.39
        let o = open(TaskType::McpManagement, ComplexityLevel::Simple);
        let near = Outcome::new(ResultStatus::FailureUser, 1.0).with_accuracy(0.95);
        assert_eq!(assess_outcome(&o, &near), LearningValue::Low);
        // 0.3 + 0.1 - 0.2 + 0.5 * 0.2 + 0.2 = 0.5
        let half = two_tools(ResultStatus::FailureUser).with_accuracy(0.5);
        assert_eq!(assess_outcome(&o, &half), LearningValue::Medium);

        // 0.3 + 0.1 - 0.2 = 0.2
        let o = open(TaskType::DataAnalysis, ComplexityLevel::Simple);
        let failed = Outcome::new(ResultStatus::FailureResource, 1.0);
        assert_eq!(assess_outcome(&o, &failed), LearningValue::Low);
        // 0.0 + 0.3 - 0.2 = 0.1
        let o = open(TaskType::SystemOperation, ComplexityLevel::Moderate);
        assert_eq!(assess_outcome(&o, &failed), LearningValue::Negative);
    }

    #[test]
    fn test_record_and_outcome_paths_agree() {
        let o = open(TaskType::McpManagement, ComplexityLevel::Complex);
        let outcome = Outcome::new(ResultStatus::FailureConfig, 3.0).with_accuracy(0.9);
        let expected = assess_outcome(&o, &outcome);
        let record = o.close(outcome, expected);

        assert_eq!(assess_learning_value(&record), expected);
        assert_eq!(assess_learning_value(&record), assess_learning_value(&record));
    }
}
