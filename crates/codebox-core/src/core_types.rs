//! Core data types shared across the execution pipeline
//!
//! This module defines the request and result shapes that form the entire
//! caller-facing surface of the engine. Requests arrive untyped (the caller
//! declares a language by name), pass through validation into a typed
//! `ExecutionRequest`, and every path out of the engine produces exactly one
//! `ExecutionResult`. Both wire types serialize with camelCase field names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder reported when a successful run produced no observable output.
pub const NO_OUTPUT: &str = "(no output)";

/// The guest languages this engine can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    Python,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::Python => "python",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "javascript" | "js" | "node" | "nodejs" => Ok(Language::JavaScript),
            "python" | "python3" | "py" => Ok(Language::Python),
            other => Err(format!("unknown language '{}'", other)),
        }
    }
}

/// An execution request as submitted by a caller, before validation.
///
/// `language` is a free-form string at this stage so that an unknown label
/// can still be echoed back in the rejection result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExecutionRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
}

/// A validated request, ready for dispatch. Defaults have been applied and
/// every field is within bounds.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: Language,
    pub timeout_ms: u64,
    pub memory_limit_mb: u64,
}

/// The uniform outcome of one execution request.
///
/// Exactly one of `output`/`error` is populated, according to `success`.
/// `execution_time_ms` is measured from dispatch to completion and is zero
/// when the request was rejected before dispatch. `language` echoes the
/// caller's declared language even when validation failed. `memory_used_mb`
/// is best-effort and only reported by executors that can measure it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used_mb: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_language_parsing_accepts_aliases() {
        assert_eq!("javascript".parse::<Language>(), Ok(Language::JavaScript));
        assert_eq!("node".parse::<Language>(), Ok(Language::JavaScript));
        assert_eq!("JS".parse::<Language>(), Ok(Language::JavaScript));
        assert_eq!("python3".parse::<Language>(), Ok(Language::Python));
        assert_eq!("py".parse::<Language>(), Ok(Language::Python));
        assert!("ruby".parse::<Language>().is_err());
    }

    #[test]
    fn test_raw_request_deserializes_with_defaults() {
        let raw: RawExecutionRequest =
            serde_json::from_value(json!({"code": "1 + 1", "language": "javascript"})).unwrap();
        assert_eq!(raw.code, "1 + 1");
        assert!(raw.timeout_ms.is_none());
        assert!(raw.memory_limit_mb.is_none());
    }

    #[test]
    fn test_result_serializes_camel_case_and_omits_absent_fields() {
        let result = ExecutionResult {
            success: true,
            output: Some("hi".to_string()),
            error: None,
            execution_time_ms: 12,
            language: "javascript".to_string(),
            memory_used_mb: None,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["output"], "hi");
        assert_eq!(value["executionTimeMs"], 12);
        assert!(value.get("error").is_none());
        assert!(value.get("memoryUsedMb").is_none());
    }
}
