//! Fail-closed validation and anonymization of closed records.

use interlog_core::InteractionRecord;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use thiserror::Error;

pub const MAX_EXECUTION_TIME_S: f64 = 3600.0;
pub const ANONYMIZED_HOSTNAME: &str = "anonymized";
const USER_HASH_LEN: usize = 16;

/// Kind of sensitive data detected in a command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivePattern {
    CreditCard,
    Email,
    Ssn,
    Ipv4,
}

impl SensitivePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensitivePattern::CreditCard => "credit_card",
            SensitivePattern::Email => "email",
            SensitivePattern::Ssn => "ssn",
            SensitivePattern::Ipv4 => "ipv4",
        }
    }
}

/// Why a record was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationFailure {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("execution time {0}s is negative or not a number")]
    InvalidExecutionTime(f64),
    #[error("satisfaction {0} is outside 1..=5")]
    SatisfactionOutOfRange(u8),
    #[error("accuracy score {0} is outside [0, 1]")]
    AccuracyOutOfRange(f64),
    #[error("execution time {0}s exceeds 3600s")]
    ExecutionTimeTooLong(f64),
    #[error("command contains sensitive data ({})", .0.as_str())]
    SensitiveData(SensitivePattern),
}

static SENSITIVE_PATTERNS: OnceLock<Vec<(SensitivePattern, Regex)>> = OnceLock::new();

fn sensitive_patterns() -> &'static [(SensitivePattern, Regex)] {
    SENSITIVE_PATTERNS.get_or_init(|| {
        [
            (SensitivePattern::CreditCard, r"\b(?:\d{4}[-\s]?){3}\d{4}\b"),
            (SensitivePattern::Email, r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
            (SensitivePattern::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
            (SensitivePattern::Ipv4, r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
        ]
        .into_iter()
        .filter_map(|(kind, pattern)| match Regex::new(pattern) {
            Ok(re) => Some((kind, re)),
            Err(e) => {
                tracing::error!(pattern = kind.as_str(), "Invalid sensitive-data regex: {}", e);
                None
            }
        })
        .collect()
    })
}

/// Runs every check in order; the first failure wins.
pub fn validate(record: &InteractionRecord) -> Result<(), ValidationFailure> {
    check_required(record)?;
    check_types(record)?;
    check_ranges(record)?;
    check_privacy(record)
}

pub fn is_valid(record: &InteractionRecord) -> bool {
    validate(record).is_ok()
}

fn check_required(record: &InteractionRecord) -> Result<(), ValidationFailure> {
    let required = [
        ("id", record.id.as_str()),
        ("session_id", record.session_id.as_str()),
        ("command", record.command.as_str()),
    ];
    match required.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((name, _)) => Err(ValidationFailure::MissingField(*name)),
        None => Ok(()),
    }
}

fn check_types(record: &InteractionRecord) -> Result<(), ValidationFailure> {
    let t = record.execution_time_s;
    if t.is_nan() || t < 0.0 {
        return Err(ValidationFailure::InvalidExecutionTime(t));
    }
    if let Some(rating) = record.satisfaction {
        if !(1..=5).contains(&rating) {
            return Err(ValidationFailure::SatisfactionOutOfRange(rating));
        }
    }
    Ok(())
}

fn check_ranges(record: &InteractionRecord) -> Result<(), ValidationFailure> {
    if let Some(score) = record.accuracy_score {
        if !(0.0..=1.0).contains(&score) {
            return Err(ValidationFailure::AccuracyOutOfRange(score));
        }
    }
    if record.execution_time_s > MAX_EXECUTION_TIME_S {
        return Err(ValidationFailure::ExecutionTimeTooLong(record.execution_time_s));
    }
    Ok(())
}

/// Scans the command line and serialized arguments. Environment data is not scanned.
fn check_privacy(record: &InteractionRecord) -> Result<(), ValidationFailure> {
    let arguments = serde_json::to_string(&record.arguments).unwrap_or_default();
    let text = format!("{} {}", record.command, arguments);

    match sensitive_patterns().iter().find(|(_, re)| re.is_match(&text)) {
        Some((kind, _)) => Err(ValidationFailure::SensitiveData(*kind)),
        None => Ok(()),
    }
}

/// Truncated SHA-256 of a user identifier.
pub fn hash_identifier(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
        .chars()
        .take(USER_HASH_LEN)
        .collect()
}

/// Scrubs identifying fields. Everything else passes through unchanged.
pub fn anonymize(mut record: InteractionRecord) -> InteractionRecord {
    if let Some(user) = record.user_identifier.take() {
        record.user_identifier = Some(hash_identifier(&user));
    }
    record.environment_info.remove("ip_address");
    if let Some(hostname) = record.environment_info.get_mut("hostname") {
        *hostname = serde_json::Value::String(ANONYMIZED_HOSTNAME.to_string());
    }
    record
}
