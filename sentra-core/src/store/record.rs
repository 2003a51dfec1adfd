//! Execution history records
//!
//! One row per tool run, written exactly once, never updated. The status
//! pair distinguishes "tool failed" from "tool ran but parsing failed".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal outcome of a tool run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    /// The tool itself succeeded but its output yielded no entities
    PartialSuccess,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::PartialSuccess => "partial",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(ExecutionStatus::Success),
            "partial" => Ok(ExecutionStatus::PartialSuccess),
            "failed" => Ok(ExecutionStatus::Failed),
            _ => Err(format!("Unknown execution status: {}", s)),
        }
    }
}

/// Outcome of the parse step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Parsed,
    ParseFailed,
    EmptyOutput,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Parsed => "parsed",
            ParseStatus::ParseFailed => "parse_failed",
            ParseStatus::EmptyOutput => "empty_output",
        }
    }
}

impl std::fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ParseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "parsed" => Ok(ParseStatus::Parsed),
            "parse_failed" => Ok(ParseStatus::ParseFailed),
            "empty_output" => Ok(ParseStatus::EmptyOutput),
            _ => Err(format!("Unknown parse status: {}", s)),
        }
    }
}

/// One immutable execution history row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub tool_id: String,
    pub stage_id: Option<i64>,
    pub status: ExecutionStatus,
    pub parse_status: ParseStatus,
    pub raw_output: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub entities_created: u32,
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    /// Generate a fresh execution id
    pub fn new_execution_id() -> String {
        format!("exec_{}", Uuid::new_v4().simple())
    }
}
