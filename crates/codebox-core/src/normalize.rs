//! Folds every execution outcome into the uniform `ExecutionResult` shape.
//!
//! Success fills `output` (with the `"(no output)"` placeholder when the run
//! produced nothing observable), failure fills `error` with the categorized
//! message, and both stamp `executionTimeMs` from the dispatch instant.
//! Validation rejections report zero execution time since no executor ran.

use std::time::Instant;

use crate::core_types::{ExecutionResult, NO_OUTPUT};
use crate::errors::SandboxError;
use crate::executors::RunOutput;

pub fn finish(
    language: &str,
    started: Instant,
    outcome: Result<RunOutput, SandboxError>,
) -> ExecutionResult {
    let execution_time_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(run) => {
            let output = if run.output.trim().is_empty() {
                NO_OUTPUT.to_string()
            } else {
                run.output
            };
            ExecutionResult {
                success: true,
                output: Some(output),
                error: None,
                execution_time_ms,
                language: language.to_string(),
                memory_used_mb: run.memory_used_mb,
            }
        }
        Err(e) => {
            log::warn!("{} execution failed: {}", language, e);
            ExecutionResult {
                success: false,
                output: None,
                error: Some(e.to_string()),
                execution_time_ms,
                language: language.to_string(),
                memory_used_mb: None,
            }
        }
    }
}

pub fn rejection(language: &str, error: SandboxError) -> ExecutionResult {
    ExecutionResult {
        success: false,
        output: None,
        error: Some(error.to_string()),
        execution_time_ms: 0,
        language: language.to_string(),
        memory_used_mb: None,
    }
}
