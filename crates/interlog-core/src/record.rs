//! Interaction record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// JSON object used for arguments, context, outputs and environment data.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Raised when a stored enum string does not name a known variant.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Broad category of work a CLI command performs.
///
/// Declaration order is significant: it breaks classifier ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    GaiaTesting,
    McpManagement,
    DataAnalysis,
    CodeGeneration,
    SystemOperation,
}

impl TaskType {
    pub const ALL: [TaskType; 5] = [
        TaskType::GaiaTesting,
        TaskType::McpManagement,
        TaskType::DataAnalysis,
        TaskType::CodeGeneration,
        TaskType::SystemOperation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::GaiaTesting => "gaia_testing",
            TaskType::McpManagement => "mcp_management",
            TaskType::DataAnalysis => "data_analysis",
            TaskType::CodeGeneration => "code_generation",
            TaskType::SystemOperation => "system_operation",
        }
    }
}

impl FromStr for TaskType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("task type", s))
    }
}

/// Coarse difficulty bucket derived from command shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
    Expert,
}

impl ComplexityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityLevel::Simple => "simple",
            ComplexityLevel::Moderate => "moderate",
            ComplexityLevel::Complex => "complex",
            ComplexityLevel::Expert => "expert",
        }
    }
}

impl FromStr for ComplexityLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(ComplexityLevel::Simple),
            "moderate" => Ok(ComplexityLevel::Moderate),
            "complex" => Ok(ComplexityLevel::Complex),
            "expert" => Ok(ComplexityLevel::Expert),
            _ => Err(UnknownVariant::new("complexity", s)),
        }
    }
}

/// How an interaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    SuccessPerfect,
    SuccessPartial,
    SuccessAcceptable,
    FailureUser,
    FailureSystem,
    FailureConfig,
    FailureResource,
}

impl ResultStatus {
    pub const ALL: [ResultStatus; 7] = [
        ResultStatus::SuccessPerfect,
        ResultStatus::SuccessPartial,
        ResultStatus::SuccessAcceptable,
        ResultStatus::FailureUser,
        ResultStatus::FailureSystem,
        ResultStatus::FailureConfig,
        ResultStatus::FailureResource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::SuccessPerfect => "success_perfect",
            ResultStatus::SuccessPartial => "success_partial",
            ResultStatus::SuccessAcceptable => "success_acceptable",
            ResultStatus::FailureUser => "failure_user",
            ResultStatus::FailureSystem => "failure_system",
            ResultStatus::FailureConfig => "failure_config",
            ResultStatus::FailureResource => "failure_resource",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ResultStatus::SuccessPerfect
                | ResultStatus::SuccessPartial
                | ResultStatus::SuccessAcceptable
        )
    }
}

impl FromStr for ResultStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResultStatus::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("result status", s))
    }
}

/// Usefulness of a record for downstream dataset construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningValue {
    High,
    Medium,
    Low,
    Negative,
}

impl LearningValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningValue::High => "high",
            LearningValue::Medium => "medium",
            LearningValue::Low => "low",
            LearningValue::Negative => "negative",
        }
    }
}

impl FromStr for LearningValue {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(LearningValue::High),
            "medium" => Ok(LearningValue::Medium),
            "low" => Ok(LearningValue::Low),
            "negative" => Ok(LearningValue::Negative),
            _ => Err(UnknownVariant::new("learning value", s)),
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(TaskType, ComplexityLevel, ResultStatus, LearningValue);

/// An interaction that has been started but not yet ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenInteraction {
    pub id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub arguments: JsonMap,
    pub context: JsonMap,
    pub task_type: TaskType,
    pub subcategory: String,
    pub complexity: ComplexityLevel,
    pub user_identifier: Option<String>,
    pub environment_info: JsonMap,
}

impl OpenInteraction {
    /// Merges the outcome into a closed record.
    ///
    /// `learning_value` must be the value the classifier derives from the
    /// resulting record; the collector is the only caller.
    pub fn close(self, outcome: Outcome, learning_value: LearningValue) -> InteractionRecord {
        InteractionRecord {
            id: self.id,
            session_id: self.session_id,
            timestamp: self.timestamp,
            command: self.command,
            arguments: self.arguments,
            context: self.context,
            task_type: self.task_type,
            subcategory: self.subcategory,
            complexity: self.complexity,
            execution_time_s: outcome.execution_time_s,
            tools_used: outcome.tools_used,
            adapters_used: outcome.adapters_used,
            result_status: outcome.result_status,
            output_data: outcome.output_data,
            error_info: outcome.error_info,
            accuracy_score: outcome.accuracy_score,
            satisfaction: outcome.satisfaction,
            learning_value,
            user_identifier: self.user_identifier,
            environment_info: self.environment_info,
        }
    }
}

/// Data supplied when an interaction ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub result_status: ResultStatus,
    pub execution_time_s: f64,
    #[serde(default)]
    pub output_data: Option<JsonMap>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub adapters_used: Vec<String>,
    #[serde(default)]
    pub accuracy_score: Option<f64>,
    #[serde(default)]
    pub satisfaction: Option<u8>,
    #[serde(default)]
    pub error_info: Option<JsonMap>,
}

impl Outcome {
    pub fn new(result_status: ResultStatus, execution_time_s: f64) -> Self {
        Self {
            result_status,
            execution_time_s,
            output_data: None,
            tools_used: Vec::new(),
            adapters_used: Vec::new(),
            accuracy_score: None,
            satisfaction: None,
            error_info: None,
        }
    }

    pub fn with_output(mut self, output: JsonMap) -> Self {
        self.output_data = Some(output);
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools_used = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_adapters<I, S>(mut self, adapters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.adapters_used = adapters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_accuracy(mut self, score: f64) -> Self {
        self.accuracy_score = Some(score);
        self
    }

    pub fn with_satisfaction(mut self, rating: u8) -> Self {
        self.satisfaction = Some(rating);
        self
    }

    pub fn with_error(mut self, error: JsonMap) -> Self {
        self.error_info = Some(error);
        self
    }
}

/// A completed interaction, as validated, anonymized and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// Unique record identifier.
    pub id: String,
    /// Collector session that captured the record.
    pub session_id: String,
    /// When the interaction started.
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub arguments: JsonMap,
    pub context: JsonMap,
    pub task_type: TaskType,
    pub subcategory: String,
    pub complexity: ComplexityLevel,
    /// Wall-clock duration in seconds, 0..=3600.
    pub execution_time_s: f64,
    pub tools_used: Vec<String>,
    pub adapters_used: Vec<String>,
    pub result_status: ResultStatus,
    pub output_data: Option<JsonMap>,
    pub error_info: Option<JsonMap>,
    /// Accuracy in [0, 1] when measured.
    pub accuracy_score: Option<f64>,
    /// User rating in 1..=5 when given.
    pub satisfaction: Option<u8>,
    /// Derived from the other fields at close time.
    pub learning_value: LearningValue,
    pub user_identifier: Option<String>,
    pub environment_info: JsonMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_strings_round_trip() {
        for t in TaskType::ALL {
            assert_eq!(t.as_str().parse::<TaskType>().unwrap(), t);
        }
        for r in ResultStatus::ALL {
            assert_eq!(r.as_str().parse::<ResultStatus>().unwrap(), r);
        }
        assert_eq!("expert".parse::<ComplexityLevel>().unwrap(), ComplexityLevel::Expert);
        assert_eq!("negative".parse::<LearningValue>().unwrap(), LearningValue::Negative);
    }

    #[test]
    fn test_unknown_variant_is_error() {
        let err = "GAIA_TESTING".parse::<TaskType>().unwrap_err();
        assert_eq!(err.kind, "task type");
        assert!("".parse::<LearningValue>().is_err());
    }

    #[test]
    fn test_serde_uses_declared_strings() {
        let json = serde_json::to_string(&ResultStatus::FailureConfig).unwrap();
        assert_eq!(json, "\"failure_config\"");
        assert_eq!(TaskType::McpManagement.to_string(), "mcp_management");
    }

    #[test]
    fn test_success_statuses() {
        assert!(ResultStatus::SuccessAcceptable.is_success());
        assert!(!ResultStatus::FailureResource.is_success());
    }

    #[test]
    fn test_close_merges_outcome() {
        let open = OpenInteraction {
            id: "rec-1".to_string(),
            session_id: "sess-1".to_string(),
            timestamp: Utc::now(),
            command: "mcp list".to_string(),
            arguments: JsonMap::new(),
            context: JsonMap::new(),
            task_type: TaskType::McpManagement,
            subcategory: "adapter_query".to_string(),
            complexity: ComplexityLevel::Simple,
            user_identifier: Some("alice".to_string()),
            environment_info: JsonMap::new(),
        };

        let outcome = Outcome::new(ResultStatus::SuccessPerfect, 1.5)
            .with_tools(["claude_mcp"])
            .with_satisfaction(4);
        let record = open.close(outcome, LearningValue::Medium);

        assert_eq!(record.id, "rec-1");
        assert_eq!(record.execution_time_s, 1.5);
        assert_eq!(record.tools_used, vec!["claude_mcp".to_string()]);
        assert_eq!(record.satisfaction, Some(4));
        assert_eq!(record.learning_value, LearningValue::Medium);
        assert_eq!(record.user_identifier.as_deref(), Some("alice"));
    }
}
